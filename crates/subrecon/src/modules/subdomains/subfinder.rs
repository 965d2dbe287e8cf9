use super::SubdomainModule;
use crate::modules::Module;

// region:        --- Module info

pub struct Subfinder {}

impl Subfinder {
    pub fn new() -> Self {
        Self {}
    }
}

impl Module for Subfinder {
    fn name(&self) -> String {
        "subdomains/subfinder".to_string()
    }

    fn description(&self) -> String {
        "Run subfinder passive sources".to_string()
    }
}

// endregion:     --- Module info

impl SubdomainModule for Subfinder {
    fn program(&self) -> String {
        "subfinder".to_string()
    }

    fn args(&self, domain: &str) -> Vec<String> {
        vec!["-d".to_string(), domain.to_string()]
    }
}
