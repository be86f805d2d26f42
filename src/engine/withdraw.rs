// 8.7 engine/withdraw.rs: vault payouts and bad debt settlement.
// the ecosystem fund backs the vault. advances it makes during a payout are
// tracked per market as prepaid bad debt and consumed first when bad debt is realized.

use super::core::Engine;
use super::results::EngineError;
use super::state::Tx;
use crate::events::{BadDebtRealizedEvent, EventPayload, PrepaidBadDebtBorrowedEvent};
use crate::ledger::{Ledger, Transfer, ECOSYSTEM_FUND, VAULT};
use crate::oracle::Oracle;
use crate::types::{round_int, Pair, TraderAddr};
use rust_decimal::Decimal;

impl<L: Ledger, O: Oracle> Engine<L, O> {
    /// Pays `amount` of the pair's quote denom out of the vault, borrowing any shortfall.
    pub fn withdraw(
        &mut self,
        pair: &Pair,
        receiver: &TraderAddr,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        self.execute(|tx| tx.withdraw(pair, receiver, amount))
    }

    pub fn realize_bad_debt(&mut self, pair: &Pair, bad_debt: Decimal) -> Result<(), EngineError> {
        self.execute(|tx| tx.realize_bad_debt(pair, bad_debt))
    }
}

impl<'a> Tx<'a> {
    // 8.7.1: no-op for non-positive amounts. amounts are whole units.
    pub(super) fn withdraw(
        &mut self,
        pair: &Pair,
        receiver: &TraderAddr,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        let amount = round_int(amount);
        if amount <= Decimal::ZERO {
            return Ok(());
        }

        let mut market = self.market(pair)?;
        let denom = pair.quote_denom().to_string();
        let vault_balance = self.balance(VAULT, &denom);

        if vault_balance < amount {
            let shortage = amount - vault_balance;
            market.prepaid_bad_debt += shortage;
            self.save_market(&market)?;
            self.transfer(Transfer::ModuleToModule {
                from: ECOSYSTEM_FUND,
                to: VAULT,
                denom: denom.clone(),
                amount: shortage,
            })?;

            tracing::warn!(
                %pair,
                %shortage,
                prepaid = %market.prepaid_bad_debt,
                "vault short, borrowing from ecosystem fund"
            );
            self.emit(EventPayload::PrepaidBadDebtBorrowed(PrepaidBadDebtBorrowedEvent {
                pair: pair.clone(),
                shortfall: shortage,
                prepaid_bad_debt: market.prepaid_bad_debt,
            }));
        }

        self.transfer(Transfer::ModuleToAccount {
            module: VAULT,
            to: receiver.clone(),
            denom,
            amount,
        })
    }

    // 8.7.2: prepaid credit first, the rest is drawn fresh from the ecosystem fund
    pub(super) fn realize_bad_debt(
        &mut self,
        pair: &Pair,
        bad_debt: Decimal,
    ) -> Result<(), EngineError> {
        let bad_debt = round_int(bad_debt);
        if bad_debt <= Decimal::ZERO {
            return Ok(());
        }

        let mut market = self.market(pair)?;
        let (covered_by_prepaid, drawn) = if market.prepaid_bad_debt >= bad_debt {
            market.prepaid_bad_debt -= bad_debt;
            (bad_debt, Decimal::ZERO)
        } else {
            let drawn = bad_debt - market.prepaid_bad_debt;
            let covered = market.prepaid_bad_debt;
            self.transfer(Transfer::ModuleToModule {
                from: ECOSYSTEM_FUND,
                to: VAULT,
                denom: pair.quote_denom().to_string(),
                amount: drawn,
            })?;
            market.prepaid_bad_debt = Decimal::ZERO;
            (covered, drawn)
        };
        self.save_market(&market)?;

        tracing::warn!(%pair, %bad_debt, %covered_by_prepaid, %drawn, "bad debt realized");
        self.emit(EventPayload::BadDebtRealized(BadDebtRealizedEvent {
            pair: pair.clone(),
            amount: bad_debt,
            covered_by_prepaid,
            drawn_from_ecosystem_fund: drawn,
        }));
        Ok(())
    }
}
