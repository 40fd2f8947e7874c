//! Contracts each scope requires on its own.

use super::{Contract, Scope};

// Request-ID first: later kernel stages log it when they reject a request.
const KERNEL: &[Contract] = &[Contract::REQUEST_ID, Contract::URL_ENCODING, Contract::CLIENT_IP];

impl Scope {
    /// Mandatory contracts for this scope, in execution order.
    ///
    /// Group and route scopes start empty; their declarations add to it.
    pub fn registered_contracts(self) -> &'static [Contract] {
        match self {
            Self::Kernel => KERNEL,
            Self::Group | Self::Route => &[],
        }
    }

    /// Registered contracts followed by `declared`, first occurrence kept.
    pub fn required_contracts(self, declared: &[Contract]) -> Vec<Contract> {
        let mut required: Vec<Contract> = Vec::with_capacity(self.registered_contracts().len() + declared.len());
        for &contract in self.registered_contracts().iter().chain(declared) {
            if !required.contains(&contract) {
                required.push(contract);
            }
        }
        required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_contracts_are_fixed_and_ordered() {
        assert_eq!(
            Scope::Kernel.registered_contracts(),
            &[Contract::REQUEST_ID, Contract::URL_ENCODING, Contract::CLIENT_IP]
        );
    }

    #[test]
    fn group_and_route_start_empty() {
        assert!(Scope::Group.registered_contracts().is_empty());
        assert!(Scope::Route.registered_contracts().is_empty());
    }

    #[test]
    fn declared_contracts_follow_registered_ones_without_duplicates() {
        let required = Scope::Kernel.required_contracts(&[Contract::TLS, Contract::REQUEST_ID, Contract::TLS]);
        assert_eq!(required, vec![
            Contract::REQUEST_ID,
            Contract::URL_ENCODING,
            Contract::CLIENT_IP,
            Contract::TLS,
        ]);
    }
}
