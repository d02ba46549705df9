//! Published method tables for the two contracts.
//!
//! This is the interface description clients and front-ends code against; it
//! serializes to JSON in the same shape regardless of which ledger hosts the
//! contracts.

use serde::{Deserialize, Serialize};

use crate::contracts::ContractKind;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    View,
    Nonpayable,
    Payable,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: String,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    pub mutability: Mutability,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceDescription {
    pub contract: ContractKind,
    pub methods: Vec<MethodSpec>,
}

impl InterfaceDescription {
    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }
}

fn param(name: &str, ty: &str) -> Param {
    Param {
        name: name.to_string(),
        ty: ty.to_string(),
    }
}

fn method(name: &str, inputs: Vec<Param>, outputs: Vec<Param>, mutability: Mutability) -> MethodSpec {
    MethodSpec {
        name: name.to_string(),
        inputs,
        outputs,
        mutability,
    }
}

pub fn registry_interface() -> InterfaceDescription {
    InterfaceDescription {
        contract: ContractKind::Registry,
        methods: vec![
            method(
                "createNewInstance",
                vec![param("minimumContribution", "uint64")],
                vec![param("instance", "address")],
                Mutability::Nonpayable,
            ),
            method(
                "getDeployedInstances",
                vec![],
                vec![param("", "address[]")],
                Mutability::View,
            ),
        ],
    }
}

pub fn campaign_interface() -> InterfaceDescription {
    InterfaceDescription {
        contract: ContractKind::Campaign,
        methods: vec![
            method("contribute", vec![], vec![], Mutability::Payable),
            method("manager", vec![], vec![param("", "address")], Mutability::View),
            method(
                "contributors",
                vec![param("identity", "address")],
                vec![param("", "bool")],
                Mutability::View,
            ),
            method(
                "minimumContribution",
                vec![],
                vec![param("", "uint64")],
                Mutability::View,
            ),
            method(
                "getSummary",
                vec![],
                vec![
                    param("address", "address"),
                    param("manager", "address"),
                    param("minimumContribution", "uint64"),
                    param("balance", "uint64"),
                    param("contributorCount", "uint64"),
                ],
                Mutability::View,
            ),
        ],
    }
}

pub fn interface_for(kind: ContractKind) -> InterfaceDescription {
    match kind {
        ContractKind::Registry => registry_interface(),
        ContractKind::Campaign => campaign_interface(),
    }
}
