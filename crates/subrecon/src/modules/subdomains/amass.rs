use super::SubdomainModule;
use crate::modules::Module;

// region:        --- Module info

pub struct Amass {}

impl Amass {
    pub fn new() -> Self {
        Self {}
    }
}

impl Module for Amass {
    fn name(&self) -> String {
        "subdomains/amass".to_string()
    }

    fn description(&self) -> String {
        "Run amass in passive mode (output uses --> connectors)".to_string()
    }
}

// endregion:     --- Module info

impl SubdomainModule for Amass {
    fn program(&self) -> String {
        "amass".to_string()
    }

    fn args(&self, domain: &str) -> Vec<String> {
        ["enum", "-passive", "-d", domain]
            .into_iter()
            .map(String::from)
            .collect()
    }
}
