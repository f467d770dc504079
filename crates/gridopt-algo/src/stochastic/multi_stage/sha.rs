use gridopt_core::Network;

use super::policy::Policy;
use super::problem::Forecast;
use super::MultiStageMethod;
use crate::config::MsDcOpfParams;
use crate::opf::OpfError;

/// Stochastic hybrid approximation method for the multi-stage DC OPF.
///
/// Not implemented: `solve` always returns [`OpfError::NotImplemented`].
pub struct MsDcOpfSha {
    params: MsDcOpfParams,
}

impl Default for MsDcOpfSha {
    fn default() -> Self {
        Self::new()
    }
}

impl MsDcOpfSha {
    pub const NAME: &'static str = "MS-DCOPF-SHA";

    pub fn new() -> Self {
        Self {
            params: MsDcOpfParams::default(),
        }
    }

    pub fn params(&self) -> &MsDcOpfParams {
        &self.params
    }
}

impl MultiStageMethod for MsDcOpfSha {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn solve(&self, _net: &Network, _forecast: Forecast) -> Result<Box<dyn Policy>, OpfError> {
        Err(OpfError::NotImplemented(format!(
            "{}: stochastic hybrid approximation policy",
            Self::NAME
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha_is_explicitly_unimplemented() {
        let method = MsDcOpfSha::new();
        let result = method.solve(&Network::new(), Forecast::new(vec![vec![]]));
        assert!(matches!(result, Err(OpfError::NotImplemented(_))));
        assert_eq!(method.name(), "MS-DCOPF-SHA");
    }
}
