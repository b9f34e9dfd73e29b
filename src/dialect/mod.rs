use crate::Error;
use crate::design::{Design, Raw};

pub mod hse;

pub use hse::Hse;

/// A source language that can hand the core a graph and its variables.
pub trait Dialect {
    fn name(&self) -> &'static str;

    /// File extensions, without the dot.
    fn extensions(&self) -> &[&'static str];

    fn import(&self, source: &str) -> Result<Design<Raw>, Error>;
}

/// Dialects known to one driver, looked up by file extension.
#[derive(Default)]
pub struct Registry {
    dialects: Vec<Box<dyn Dialect>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Hse));
        registry
    }

    /// Later registrations shadow earlier ones for the same extension.
    pub fn register(&mut self, dialect: Box<dyn Dialect>) {
        self.dialects.insert(0, dialect);
    }

    pub fn find(&self, ext: &str) -> Result<&dyn Dialect, Error> {
        self.dialects
            .iter()
            .find(|d| d.extensions().contains(&ext))
            .map(|d| &**d)
            .ok_or_else(|| Error::InvalidType(ext.to_string()))
    }

    pub fn import(&self, ext: &str, source: &str) -> Result<Design<Raw>, Error> {
        self.find(ext)?.import(source)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.dialects.iter().map(|d| d.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_extension() {
        let registry = Registry::with_defaults();
        assert_eq!(registry.find("hse").unwrap().name(), "hse");
        assert!(matches!(
            registry.find("chp"),
            Err(Error::InvalidType(ext)) if ext == "chp"
        ));
    }

    #[test]
    fn test_registration_shadows() {
        struct Empty;

        impl Dialect for Empty {
            fn name(&self) -> &'static str {
                "empty"
            }

            fn extensions(&self) -> &[&'static str] {
                &["hse"]
            }

            fn import(&self, _: &str) -> Result<Design<Raw>, Error> {
                Ok(Design::new(Default::default(), Default::default()))
            }
        }

        let mut registry = Registry::with_defaults();
        registry.register(Box::new(Empty));
        assert_eq!(registry.find("hse").unwrap().name(), "empty");
        assert_eq!(registry.names(), vec!["empty", "hse"]);
    }
}
