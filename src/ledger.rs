//! Token ledger collaborator.
//!
//! The engine never holds balances itself. It moves whole units of the quote
//! denom between trader accounts and three module accounts through [`Ledger`].
//! [`PendingTransfers`] lets an operation plan every transfer up front, check
//! them against current balances, and execute them only on commit.

use crate::types::{round_int, TraderAddr};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holds trader margin.
pub const VAULT: &str = "vault";
/// Absorbs bad debt, receives liquidation and ecosystem fees.
pub const ECOSYSTEM_FUND: &str = "perp_ef";
/// Receives exchange fees.
pub const FEE_POOL: &str = "fee_pool";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient {denom} in {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: String,
        denom: String,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("transfer amount must be a positive whole number, got {0}")]
    InvalidAmount(Decimal),
}

/// Bank interface the engine settles through.
///
/// Transfers of a committed operation were checked against `balance` when they
/// were planned. An implementation may still refuse one at execution time; the
/// transfers already executed in that batch are then moved back.
pub trait Ledger {
    fn balance(&self, account: &str, denom: &str) -> Decimal;

    fn transfer_from_account_to_module(
        &mut self,
        from: &TraderAddr,
        module: &str,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError>;

    fn transfer_from_module_to_account(
        &mut self,
        module: &str,
        to: &TraderAddr,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError>;

    fn transfer_from_module_to_module(
        &mut self,
        from: &str,
        to: &str,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError>;
}

/// In-memory bank. accounts and modules share one namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankLedger {
    balances: BTreeMap<(String, String), Decimal>,
}

impl BankLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit without a source. genesis funding and tests.
    pub fn mint(&mut self, account: &str, denom: &str, amount: Decimal) {
        *self
            .balances
            .entry((account.to_string(), denom.to_string()))
            .or_insert(Decimal::ZERO) += amount;
    }

    fn move_funds(
        &mut self,
        from: &str,
        to: &str,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO || round_int(amount) != amount {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let balance = self.balance(from, denom);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account: from.to_string(),
                denom: denom.to_string(),
                balance,
                requested: amount,
            });
        }

        self.balances.insert((from.to_string(), denom.to_string()), balance - amount);
        self.mint(to, denom, amount);
        Ok(())
    }
}

impl Ledger for BankLedger {
    fn balance(&self, account: &str, denom: &str) -> Decimal {
        self.balances
            .get(&(account.to_string(), denom.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn transfer_from_account_to_module(
        &mut self,
        from: &TraderAddr,
        module: &str,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        self.move_funds(from.as_str(), module, denom, amount)
    }

    fn transfer_from_module_to_account(
        &mut self,
        module: &str,
        to: &TraderAddr,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        self.move_funds(module, to.as_str(), denom, amount)
    }

    fn transfer_from_module_to_module(
        &mut self,
        from: &str,
        to: &str,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        self.move_funds(from, to, denom, amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    AccountToModule { from: TraderAddr, module: &'static str, denom: String, amount: Decimal },
    ModuleToAccount { module: &'static str, to: TraderAddr, denom: String, amount: Decimal },
    ModuleToModule { from: &'static str, to: &'static str, denom: String, amount: Decimal },
}

impl Transfer {
    fn legs(&self) -> (&str, &str, &str, Decimal) {
        match self {
            Transfer::AccountToModule { from, module, denom, amount } => {
                (from.as_str(), *module, denom.as_str(), *amount)
            }
            Transfer::ModuleToAccount { module, to, denom, amount } => {
                (*module, to.as_str(), denom.as_str(), *amount)
            }
            Transfer::ModuleToModule { from, to, denom, amount } => {
                (*from, *to, denom.as_str(), *amount)
            }
        }
    }

    fn execute<L: Ledger + ?Sized>(&self, ledger: &mut L) -> Result<(), LedgerError> {
        match self {
            Transfer::AccountToModule { from, module, denom, amount } => {
                ledger.transfer_from_account_to_module(from, module, denom, *amount)
            }
            Transfer::ModuleToAccount { module, to, denom, amount } => {
                ledger.transfer_from_module_to_account(module, to, denom, *amount)
            }
            Transfer::ModuleToModule { from, to, denom, amount } => {
                ledger.transfer_from_module_to_module(from, to, denom, *amount)
            }
        }
    }

    fn reversed(&self) -> Transfer {
        match self.clone() {
            Transfer::AccountToModule { from, module, denom, amount } => {
                Transfer::ModuleToAccount { module, to: from, denom, amount }
            }
            Transfer::ModuleToAccount { module, to, denom, amount } => {
                Transfer::AccountToModule { from: to, module, denom, amount }
            }
            Transfer::ModuleToModule { from, to, denom, amount } => {
                Transfer::ModuleToModule { from: to, to: from, denom, amount }
            }
        }
    }
}

// 10.2: transfers planned by one operation, validated against ledger balances
// plus the net effect of the transfers planned before them.
#[derive(Debug, Clone, Default)]
pub struct PendingTransfers {
    planned: Vec<Transfer>,
    deltas: BTreeMap<(String, String), Decimal>,
}

impl PendingTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance<L: Ledger + ?Sized>(&self, ledger: &L, account: &str, denom: &str) -> Decimal {
        let delta = self
            .deltas
            .get(&(account.to_string(), denom.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO);
        ledger.balance(account, denom) + delta
    }

    pub fn push<L: Ledger + ?Sized>(
        &mut self,
        ledger: &L,
        transfer: Transfer,
    ) -> Result<(), LedgerError> {
        let (from, to, denom, amount) = transfer.legs();
        if amount <= Decimal::ZERO || round_int(amount) != amount {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let available = self.balance(ledger, from, denom);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: from.to_string(),
                denom: denom.to_string(),
                balance: available,
                requested: amount,
            });
        }

        let (from, to, denom) = (from.to_string(), to.to_string(), denom.to_string());
        *self.deltas.entry((from, denom.clone())).or_insert(Decimal::ZERO) -= amount;
        *self.deltas.entry((to, denom)).or_insert(Decimal::ZERO) += amount;
        self.planned.push(transfer);
        Ok(())
    }

    /// Executes the batch in order. all or nothing: when the ledger refuses a
    /// transfer, the ones before it are moved back before the error returns.
    pub fn execute<L: Ledger + ?Sized>(self, ledger: &mut L) -> Result<(), LedgerError> {
        for (done, transfer) in self.planned.iter().enumerate() {
            if let Err(err) = transfer.execute(ledger) {
                for executed in self.planned[..done].iter().rev() {
                    if let Err(undo) = executed.reversed().execute(ledger) {
                        tracing::error!(?executed, %undo, "failed to move back transfer");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn deposit(from: &TraderAddr, amount: Decimal) -> Transfer {
        Transfer::AccountToModule {
            from: from.clone(),
            module: VAULT,
            denom: "unusd".into(),
            amount,
        }
    }

    fn payout(to: &TraderAddr, amount: Decimal) -> Transfer {
        Transfer::ModuleToAccount { module: VAULT, to: to.clone(), denom: "unusd".into(), amount }
    }

    fn from_vault(to: &'static str, amount: Decimal) -> Transfer {
        Transfer::ModuleToModule { from: VAULT, to, denom: "unusd".into(), amount }
    }

    #[test]
    fn transfers_move_balances() {
        let mut bank = BankLedger::new();
        let alice = TraderAddr::new("alice");
        bank.mint("alice", "unusd", dec!(100));

        bank.transfer_from_account_to_module(&alice, VAULT, "unusd", dec!(60)).unwrap();
        assert_eq!(bank.balance("alice", "unusd"), dec!(40));
        assert_eq!(bank.balance(VAULT, "unusd"), dec!(60));

        bank.transfer_from_module_to_module(VAULT, ECOSYSTEM_FUND, "unusd", dec!(10)).unwrap();
        bank.transfer_from_module_to_account(VAULT, &alice, "unusd", dec!(50)).unwrap();
        assert_eq!(bank.balance(VAULT, "unusd"), Decimal::ZERO);
        assert_eq!(bank.balance("alice", "unusd"), dec!(90));
    }

    #[test]
    fn overdraft_rejected_without_mutation() {
        let mut bank = BankLedger::new();
        bank.mint(VAULT, "unusd", dec!(5));
        let err = bank
            .transfer_from_module_to_module(VAULT, FEE_POOL, "unusd", dec!(6))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(bank.balance(VAULT, "unusd"), dec!(5));
    }

    #[test]
    fn fractional_amounts_rejected() {
        let mut bank = BankLedger::new();
        bank.mint(VAULT, "unusd", dec!(5));
        assert_eq!(
            bank.transfer_from_module_to_module(VAULT, FEE_POOL, "unusd", dec!(1.5)),
            Err(LedgerError::InvalidAmount(dec!(1.5)))
        );
    }

    #[test]
    fn pending_transfers_net_against_each_other() {
        let mut bank = BankLedger::new();
        bank.mint("alice", "unusd", dec!(10));
        let alice = TraderAddr::new("alice");

        let mut pending = PendingTransfers::new();
        pending.push(&bank, deposit(&alice, dec!(10))).unwrap();
        // the vault only holds the 10 planned above
        pending.push(&bank, from_vault(ECOSYSTEM_FUND, dec!(10))).unwrap();
        let err = pending.push(&bank, payout(&alice, dec!(1))).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        // nothing moved yet
        assert_eq!(bank.balance("alice", "unusd"), dec!(10));
        pending.execute(&mut bank).unwrap();
        assert_eq!(bank.balance(ECOSYSTEM_FUND, "unusd"), dec!(10));
        assert_eq!(bank.balance("alice", "unusd"), Decimal::ZERO);
    }

    // refuses the transfer with index `refuse`, counting from zero
    struct FailingLedger {
        bank: BankLedger,
        calls: usize,
        refuse: usize,
    }

    impl FailingLedger {
        fn spend(&mut self) -> Result<(), LedgerError> {
            let call = self.calls;
            self.calls += 1;
            if call == self.refuse {
                return Err(LedgerError::InvalidAmount(Decimal::ZERO));
            }
            Ok(())
        }
    }

    impl Ledger for FailingLedger {
        fn balance(&self, account: &str, denom: &str) -> Decimal {
            self.bank.balance(account, denom)
        }

        fn transfer_from_account_to_module(
            &mut self,
            from: &TraderAddr,
            module: &str,
            denom: &str,
            amount: Decimal,
        ) -> Result<(), LedgerError> {
            self.spend()?;
            self.bank.transfer_from_account_to_module(from, module, denom, amount)
        }

        fn transfer_from_module_to_account(
            &mut self,
            module: &str,
            to: &TraderAddr,
            denom: &str,
            amount: Decimal,
        ) -> Result<(), LedgerError> {
            self.spend()?;
            self.bank.transfer_from_module_to_account(module, to, denom, amount)
        }

        fn transfer_from_module_to_module(
            &mut self,
            from: &str,
            to: &str,
            denom: &str,
            amount: Decimal,
        ) -> Result<(), LedgerError> {
            self.spend()?;
            self.bank.transfer_from_module_to_module(from, to, denom, amount)
        }
    }

    #[test]
    fn refused_transfer_moves_batch_back() {
        let mut bank = BankLedger::new();
        bank.mint("alice", "unusd", dec!(10));
        let alice = TraderAddr::new("alice");

        let mut pending = PendingTransfers::new();
        pending.push(&bank, deposit(&alice, dec!(10))).unwrap();
        pending.push(&bank, from_vault(FEE_POOL, dec!(4))).unwrap();
        pending.push(&bank, payout(&alice, dec!(6))).unwrap();

        let mut ledger = FailingLedger { bank, calls: 0, refuse: 2 };
        let err = pending.execute(&mut ledger).unwrap_err();
        assert_eq!(err, LedgerError::InvalidAmount(Decimal::ZERO));
        // two transfers went through and two moved them back
        assert_eq!(ledger.calls, 5);
        assert_eq!(ledger.bank.balance("alice", "unusd"), dec!(10));
        assert_eq!(ledger.bank.balance(VAULT, "unusd"), Decimal::ZERO);
        assert_eq!(ledger.bank.balance(FEE_POOL, "unusd"), Decimal::ZERO);
    }
}
