//! Ordered credits mapping
//!
//! XMLTV credits are a role to names mapping where both the role order and
//! the name order are significant. They serialize as a JSON object whose key
//! order is the order the roles were first seen.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credits(Vec<(String, Vec<String>)>);

impl Credits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name` under `role`, creating the role at the end if it is new
    pub fn push(&mut self, role: &str, name: String) {
        match self.0.iter_mut().find(|(r, _)| r == role) {
            Some((_, names)) => names.push(name),
            None => self.0.push((role.to_string(), vec![name])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(r, n)| (r.as_str(), n.as_slice()))
    }

    pub fn get(&self, role: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, n)| n.as_slice())
    }
}

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(role, names)| (role, names)))
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CreditsVisitor;

        impl<'de> Visitor<'de> for CreditsVisitor {
            type Value = Credits;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of credit role to names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Credits, A::Error> {
                let mut credits = Credits::new();
                while let Some((role, names)) = access.next_entry::<String, Vec<String>>()? {
                    for name in names {
                        credits.push(&role, name);
                    }
                }
                Ok(credits)
            }
        }

        deserializer.deserialize_map(CreditsVisitor)
    }
}
