pub mod ledger;
pub mod payment;
pub mod response;
pub mod transaction;

pub use ledger::*;
pub use payment::*;
pub use response::*;
pub use transaction::*;
