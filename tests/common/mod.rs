#![allow(dead_code)]

use nexuslite_repository::Repository;
use nexuslite_repository::exec::MemoryCollection;
use nexuslite_repository::query::QueryCache;
use nexuslite_repository::schema::{EntitySchema, PropertyKind, ScalarType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub zip_code: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub firstname: String,
    pub lastname: String,
    pub age: i32,
    pub active: bool,
    pub email: Option<String>,
    pub address: Address,
    pub location: Option<[f64; 2]>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub location: [f64; 2],
}

pub fn address_schema() -> EntitySchema {
    EntitySchema::new("Address").string("street").string("zipCode").string("city")
}

pub fn person_schema() -> EntitySchema {
    EntitySchema::new("Person")
        .string("firstname")
        .string("lastname")
        .number("age")
        .boolean("active")
        .string("email")
        .embedded("address", address_schema())
        .geo_point("location")
        .collection_of("skills", PropertyKind::Scalar(ScalarType::String))
}

pub fn venue_schema() -> EntitySchema {
    EntitySchema::new("Venue").string("name").geo_point("location")
}

fn person(first: &str, last: &str, age: i32, active: bool, zip: &str, loc: Option<[f64; 2]>, skills: &[&str]) -> Person {
    Person {
        firstname: first.into(),
        lastname: last.into(),
        age,
        active,
        email: Some(format!("{}@dmband.com", first.to_lowercase())),
        address: Address { street: "Broadway".into(), zip_code: zip.into(), city: "New York".into() },
        location: loc,
        skills: skills.iter().map(|s| (*s).to_string()).collect(),
    }
}

pub fn people() -> Vec<Person> {
    let mut alicia = person("Alicia", "Keys", 30, false, "10003", Some([-73.99, 40.7]), &["piano", "vocals"]);
    alicia.email = None;
    alicia.address.city = "Harlem".into();
    vec![
        person("Dave", "Matthews", 42, true, "10001", Some([-73.99171, 40.738868]), &["guitar", "vocals"]),
        person("Oliver August", "Matthews", 4, false, "10001", None, &[]),
        person("Carter", "Beauford", 49, true, "10002", Some([-73.9, 40.7]), &["drums"]),
        person("Boyd", "Tinsley", 45, false, "10002", None, &["violin", "vocals"]),
        person("Stefan", "Lessard", 34, true, "10002", None, &["bass"]),
        person("Leroi", "Moore", 41, true, "10001", None, &["saxophone"]),
        alicia,
    ]
}

/// The 12 venue fixture around the 10gen office.
pub fn venues() -> Vec<Venue> {
    [
        ("Penn Station", [-73.99408, 40.75057]),
        ("10gen Office", [-73.99171, 40.738868]),
        ("Flatiron Building", [-73.988135, 40.741404]),
        ("Players Club", [-73.997812, 40.739128]),
        ("City Bakery ", [-73.992491, 40.738673]),
        ("Splash Bar", [-73.992491, 40.738673]),
        ("Momofuku Milk Bar", [-73.985839, 40.731698]),
        ("Shake Shack", [-73.98820, 40.74164]),
        ("Penn Station", [-73.99408, 40.75057]),
        ("Empire State Building", [-73.98602, 40.74894]),
        ("Ulaanbaatar, Mongolia", [106.9154, 47.9245]),
        ("Maplewood, NJ", [-74.2713, 40.73137]),
    ]
    .into_iter()
    .map(|(name, location)| Venue { name: name.into(), location })
    .collect()
}

pub const OFFICE: (f64, f64) = (-73.99171, 40.738868);

pub fn people_collection() -> Arc<MemoryCollection> {
    let c = Arc::new(MemoryCollection::new("people"));
    c.insert_all(&people()).unwrap();
    c
}

pub fn venue_collection() -> Arc<MemoryCollection> {
    let c = Arc::new(MemoryCollection::new("venues"));
    c.insert_all(&venues()).unwrap();
    c
}

/// Repository with a private cache so tests do not share compiled state.
pub fn person_repo(collection: Arc<MemoryCollection>) -> Repository<Person> {
    Repository::new(collection, person_schema()).with_cache(Arc::new(QueryCache::new(64)))
}

pub fn venue_repo(collection: Arc<MemoryCollection>) -> Repository<Venue> {
    Repository::new(collection, venue_schema()).with_cache(Arc::new(QueryCache::new(64)))
}

pub fn names(people: &[Person]) -> Vec<&str> {
    people.iter().map(|p| p.firstname.as_str()).collect()
}
