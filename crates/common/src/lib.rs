//! Process-level plumbing shared by the binaries of the liquid staking workspace.

pub mod logging;
