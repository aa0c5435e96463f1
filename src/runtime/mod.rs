pub mod candidates;
pub mod diagnostics;
pub mod resolver;

pub use candidates::CandidateProvider;
pub use diagnostics::{
    AttemptOutcome, RuntimeExecutable, RuntimeOrigin, RuntimeResolveDebugInfo, RuntimeResolveError,
};
pub use resolver::{LocatorSettings, RuntimeLocator, RuntimeValidator, VersionCheck};
