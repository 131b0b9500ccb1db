//! Domain model of the ledger: money value objects, pools, ledger entries,
//! payment intents and the ports the application layer talks to.

pub mod anomaly;
pub mod intent;
pub mod ledger;
pub mod money;
pub mod order;
pub mod pool;
pub mod ports;
