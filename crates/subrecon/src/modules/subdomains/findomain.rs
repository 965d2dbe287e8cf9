use super::SubdomainModule;
use crate::modules::Module;

// region:        --- Module info

pub struct Findomain {}

impl Findomain {
    pub fn new() -> Self {
        Self {}
    }
}

impl Module for Findomain {
    fn name(&self) -> String {
        "subdomains/findomain".to_string()
    }

    fn description(&self) -> String {
        "Run findomain against certificate transparency sources".to_string()
    }
}

// endregion:     --- Module info

impl SubdomainModule for Findomain {
    fn program(&self) -> String {
        "findomain".to_string()
    }

    fn args(&self, domain: &str) -> Vec<String> {
        vec!["-t".to_string(), domain.to_string()]
    }
}
