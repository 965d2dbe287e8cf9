use super::SubdomainModule;
use crate::modules::Module;

// region:        --- Module info

pub struct Assetfinder {}

impl Assetfinder {
    pub fn new() -> Self {
        Self {}
    }
}

impl Module for Assetfinder {
    fn name(&self) -> String {
        "subdomains/assetfinder".to_string()
    }

    fn description(&self) -> String {
        "Run assetfinder passive sources".to_string()
    }
}

// endregion:     --- Module info

impl SubdomainModule for Assetfinder {
    fn program(&self) -> String {
        "assetfinder".to_string()
    }

    fn args(&self, domain: &str) -> Vec<String> {
        vec![domain.to_string()]
    }
}
