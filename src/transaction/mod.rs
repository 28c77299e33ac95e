pub mod model;

pub use model::{TX_ENCODED_LEN, Transaction, TransactionError};
