//! Domain types shared by the integration tests.
#![allow(dead_code)]

use graphmodel::{GraphEntity, Ref};
use std::collections::{BTreeMap, HashMap};

/// Field-set mixed into several node types.
#[derive(Debug, Default, Clone, GraphEntity)]
pub struct Tagged {
    #[graph(name = "knownProperty")]
    pub known_property: Option<String>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct GeneratedContainer {
    #[graph(id(generated))]
    pub id: Option<i64>,
    #[graph(flatten)]
    pub tagged: Tagged,
}

/// Three levels deep: itself, `GeneratedContainer` and `Tagged`.
#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct VersionedGeneratedContainer {
    #[graph(flatten)]
    pub base: GeneratedContainer,
    #[graph(version)]
    pub version: Option<i64>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct AssignedContainer {
    #[graph(id)]
    pub id: Option<String>,
    #[graph(flatten)]
    pub tagged: Tagged,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct VersionedAssignedContainer {
    #[graph(flatten)]
    pub base: AssignedContainer,
    #[graph(version)]
    pub version: Option<i64>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct Target {
    #[graph(id(generated))]
    pub id: Option<i64>,
}

/// Relationship with its own properties, pointing at a `Target`.
#[derive(Debug, Default, GraphEntity)]
#[graph(relationship_properties)]
pub struct Weighted {
    #[graph(id(generated))]
    pub id: Option<i64>,
    #[graph(flatten)]
    pub tagged: Tagged,
    pub weight: Option<f64>,
    #[graph(target_node)]
    pub target: Option<Ref<Target>>,
}

impl Weighted {
    pub fn to(target: &Ref<Target>, known: &str) -> Ref<Weighted> {
        Ref::new(Weighted {
            tagged: Tagged {
                known_property: Some(known.to_string()),
            },
            target: Some(target.clone()),
            ..Weighted::default()
        })
    }
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct Source {
    #[graph(id(generated))]
    pub id: Option<i64>,
    #[graph(relationship(type = "WEIGHTED"))]
    pub weighted: Option<Ref<Weighted>>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct GroupedSource {
    #[graph(id(generated))]
    pub id: Option<i64>,
    #[graph(relationship)]
    pub rels: HashMap<String, Vec<Ref<Weighted>>>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct KeyedSource {
    #[graph(id(generated))]
    pub id: Option<i64>,
    #[graph(relationship)]
    pub rels: HashMap<String, Ref<Weighted>>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct Company {
    #[graph(id)]
    pub code: Option<String>,
    pub name: String,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node(label = "Human"))]
pub struct Person {
    #[graph(id(generated))]
    pub id: Option<i64>,
    #[graph(version)]
    pub version: Option<i64>,
    pub name: String,
    pub age: Option<i64>,
    #[graph(relationship(type = "MANAGES"))]
    pub manages: Vec<Ref<Person>>,
    #[graph(relationship)]
    pub contacts: BTreeMap<String, Vec<Ref<Person>>>,
    #[graph(relationship)]
    pub employers: BTreeMap<String, Ref<Company>>,
    #[graph(skip)]
    pub scratch: Vec<String>,
}

impl Person {
    pub fn named(name: &str) -> Ref<Person> {
        Ref::new(Person {
            name: name.to_string(),
            ..Person::default()
        })
    }
}

pub fn company(code: &str, name: &str) -> Ref<Company> {
    Ref::new(Company {
        code: Some(code.to_string()),
        name: name.to_string(),
    })
}

// Types whose declarations the registry must reject.

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct TwoIds {
    #[graph(id)]
    pub first: Option<String>,
    #[graph(id)]
    pub second: Option<String>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct MixedIds {
    #[graph(id)]
    pub natural: Option<String>,
    #[graph(flatten)]
    pub base: GeneratedContainer,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct NoId {
    pub name: String,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct FloatId {
    #[graph(id)]
    pub id: Option<f64>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(relationship_properties)]
pub struct NoTargetNode {
    pub since: Option<i64>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(relationship_properties)]
pub struct TwoTargetNodes {
    #[graph(target_node)]
    pub first: Option<Ref<Target>>,
    #[graph(target_node)]
    pub second: Option<Ref<Target>>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct TwoVersions {
    #[graph(id)]
    pub id: Option<String>,
    #[graph(version)]
    pub version: Option<i64>,
    #[graph(version)]
    pub revision: Option<i64>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct DuplicateProperty {
    #[graph(id)]
    pub id: Option<String>,
    #[graph(flatten)]
    pub tagged: Tagged,
    #[graph(name = "knownProperty")]
    pub shadow: Option<String>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct FixedTypeOnMap {
    #[graph(id)]
    pub id: Option<String>,
    #[graph(relationship(type = "LINKS"))]
    pub links: BTreeMap<String, Ref<Target>>,
}

#[derive(Debug, Default, GraphEntity)]
#[graph(node)]
pub struct UntypedSingle {
    #[graph(id)]
    pub id: Option<String>,
    #[graph(relationship)]
    pub link: Option<Ref<Target>>,
}
