pub mod amass;
pub mod assetfinder;
pub mod findomain;
pub mod subfinder;

use super::Module;

/// An external enumeration tool, described by the command line it needs
/// for one root domain.
pub trait SubdomainModule: Module + Send + Sync {
    fn program(&self) -> String;
    fn args(&self, domain: &str) -> Vec<String>;
}
