pub mod aggregate;
pub mod api;
pub mod branch_id;
pub mod config;
pub mod driver;
pub mod ds;
pub mod error;
pub mod kde;
pub mod ledger;
pub mod pool;
pub mod result;
pub mod signature;
mod traits;

pub use api::{estimate, estimate_crisp};
pub use branch_id::BranchId;
pub use config::{OracleConfig, SeedPolicy};
pub use driver::{Oracle, Phase, Program, Replication, ReplicationSeeds, SampleRecord, SamplingContext};
pub use ds::{Ds, Tangent};
pub use error::{ConfigError, KdeError};
pub use kde::{Bandwidth, Kde1d};
pub use ledger::{BranchLedger, BranchRecord, Carrier, CarrierList, Side};
pub use result::{Diagnostics, Estimate, ReplicationResult};
pub use signature::PathSignature;

/// Differentiable scalar over a single input.
pub type Ds1 = Ds<1>;
/// Differentiable scalar over two inputs.
pub type Ds2 = Ds<2>;
