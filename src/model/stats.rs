use crate::model::transaction::{Transaction, TransactionType};

#[derive(Debug, Default, Eq, PartialEq)]
pub struct Stats {
    n_deposits: usize,
    n_withdrawals: usize,
    n_trades: usize,
    n_transfers: usize,

    /// Trades that had nothing to sell and became deposits instead.
    n_bootstrap_deposits: usize,

    /// Steps retried because there was nothing to withdraw or transfer.
    n_skipped: usize,
}

impl Stats {
    pub fn inc(&mut self, kind: TransactionType) {
        match kind {
            TransactionType::Deposit => self.n_deposits += 1,
            TransactionType::Withdraw => self.n_withdrawals += 1,
            TransactionType::Trade => self.n_trades += 1,
            TransactionType::Transfer => self.n_transfers += 1,
        }
    }

    pub fn inc_bootstrap(&mut self) {
        self.n_bootstrap_deposits += 1;
    }

    pub fn inc_skipped(&mut self) {
        self.n_skipped += 1;
    }

    pub fn from_transactions<'a>(txs: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut stats = Self::default();
        for tx in txs {
            stats.inc(tx.kind());
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.n_deposits + self.n_withdrawals + self.n_trades + self.n_transfers
    }

    pub fn count(&self, kind: TransactionType) -> usize {
        match kind {
            TransactionType::Deposit => self.n_deposits,
            TransactionType::Withdraw => self.n_withdrawals,
            TransactionType::Trade => self.n_trades,
            TransactionType::Transfer => self.n_transfers,
        }
    }

    pub fn bootstrap_deposits(&self) -> usize {
        self.n_bootstrap_deposits
    }

    pub fn skipped(&self) -> usize {
        self.n_skipped
    }

    pub fn pretty_print(&self) {
        println!("{self:#?}");
        println!();
    }
}
