use serde::Serialize;
use std::io;
use thiserror::Error;

use crate::model::{Accounts, UserId};

/// Errors that can occur when exporting accounts
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to write row for {user}: {source}")]
    Row { user: UserId, source: csv::Error },

    #[error("failed to flush csv output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    user: &'a str,
    balance: u64,
    first_topup_used: bool,
}

/// Write every account in csv format, ordered by user id
pub fn write_accounts<W: io::Write>(writer: W, accounts: &Accounts) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for (user, account) in accounts {
        let row = OutputRow {
            user,
            balance: account.balance.coins(),
            first_topup_used: account.first_topup_used,
        };
        writer.serialize(&row).map_err(|source| CsvError::Row {
            user: user.clone(),
            source,
        })?;
    }

    writer.flush()?;
    Ok(())
}
