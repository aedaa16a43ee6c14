//! The qubit chain a run is defined on.

use std::ops::Range;
use serde::{ Deserialize, Serialize };
use tensor_net::{ ops::LocalState, MPSResult, Truncation, MPS };
use crate::error::ConfigError;

/// An open chain of `l` physical qubits, optionally padded by one trailing
/// site that no operator touches.
///
/// Sites are indexed `0..l`; bond `b` joins sites `b` and `b + 1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chain {
    l: usize,
    dummy: bool,
}

impl Chain {
    /// Create a new chain of `l` physical sites.
    ///
    /// Fails if `l == 0`.
    pub fn new(l: usize) -> Result<Self, ConfigError> {
        if l == 0 { return Err(ConfigError::EmptyChain); }
        Ok(Self { l, dummy: false })
    }

    /// Like [`new`][Self::new], but with a trailing dummy site.
    pub fn with_dummy(l: usize) -> Result<Self, ConfigError> {
        if l == 0 { return Err(ConfigError::EmptyChain); }
        Ok(Self { l, dummy: true })
    }

    /// Return the number of physical sites.
    pub fn l(&self) -> usize { self.l }

    /// Return `true` if the chain carries a dummy site.
    pub fn has_dummy(&self) -> bool { self.dummy }

    /// Return the total number of tensor sites, including the dummy.
    pub fn nsites(&self) -> usize { self.l + usize::from(self.dummy) }

    /// Iterate over physical sites.
    pub fn sites(&self) -> Range<usize> { 0..self.l }

    /// Iterate over bonds between physical sites.
    pub fn bonds(&self) -> Range<usize> { 0..self.l.saturating_sub(1) }

    /// Return the central physical site.
    pub fn center(&self) -> usize { self.l / 2 }

    /// Build the product state with every physical site in `local`. The dummy
    /// site, if any, is `∣0⟩`.
    pub fn product_state(&self, local: LocalState, trunc: Truncation)
        -> MPSResult<MPS>
    {
        let labels =
            self.sites().map(|_| local)
            .chain(self.dummy.then_some(LocalState::Up));
        MPS::new_product(labels, trunc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_site_is_not_physical() {
        let chain = Chain::with_dummy(4).unwrap();
        assert_eq!(chain.l(), 4);
        assert_eq!(chain.nsites(), 5);
        assert_eq!(chain.bonds(), 0..3);
        let psi = chain.product_state(LocalState::Plus, Truncation::exact()).unwrap();
        assert_eq!(psi.n(), 5);
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert_eq!(Chain::new(0), Err(ConfigError::EmptyChain));
    }
}
