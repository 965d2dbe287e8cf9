pub mod subdomains;

use self::subdomains::amass::Amass;
use self::subdomains::assetfinder::Assetfinder;
use self::subdomains::findomain::Findomain;
use self::subdomains::subfinder::Subfinder;
use self::subdomains::SubdomainModule;
use crate::process::is_installed;
use crate::{Error, Result};

pub trait Module {
    fn name(&self) -> String;
    fn description(&self) -> String;
}

pub fn subdomains_modules() -> Vec<Box<dyn SubdomainModule>> {
    vec![
        Box::new(Findomain::new()),
        Box::new(Assetfinder::new()),
        Box::new(Subfinder::new()),
        Box::new(Amass::new()),
    ]
}

/// Keeps the modules whose program is in `tools`, in registry order.
pub fn select(tools: &[String]) -> Result<Vec<Box<dyn SubdomainModule>>> {
    let modules = subdomains_modules();
    if let Some(unknown) = tools
        .iter()
        .find(|tool| !modules.iter().any(|module| &module.program() == *tool))
    {
        return Err(Error::UnknownTool(unknown.clone()));
    }

    Ok(modules
        .into_iter()
        .filter(|module| tools.contains(&module.program()))
        .collect())
}

pub fn display_all() {
    println!("\nSubdomains modules");
    for module in subdomains_modules() {
        let status = if is_installed(&module.program()) {
            "installed"
        } else {
            "missing"
        };
        println!("- {:25}{:11}{}", module.name(), status, module.description());
    }
}
