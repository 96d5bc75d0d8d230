//! In-memory store. Backs unit tests and local development; enforces the same
//! atomicity and uniqueness contracts as the Postgres store under a single
//! mutex.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use gild_core::keyset::MintKeyset;
use gild_core::primitives::{MeltQuoteState, MintQuoteState, ProofState, ProofStateEntry};
use tokio::sync::Mutex;

use super::Database;
use crate::error::MintError;
use crate::model::{BlindSignatureRecord, MeltQuote, MintQuote, PendingProof, SpentProof};

#[derive(Default)]
struct Inner {
    keysets: BTreeMap<String, MintKeyset>,
    spent_proofs: HashMap<String, SpentProof>,
    pending_proofs: HashMap<String, PendingProof>,
    mint_quotes: HashMap<String, MintQuote>,
    melt_quotes: HashMap<String, MeltQuote>,
    blind_signatures: HashMap<String, BlindSignatureRecord>,
}

#[derive(Default)]
pub struct MemoryDatabase {
    inner: Mutex<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn occupied_ys<'a, I>(&self, ys: I) -> Vec<String>
    where
        I: Iterator<Item = &'a String>,
    {
        ys.filter(|y| self.spent_proofs.contains_key(*y) || self.pending_proofs.contains_key(*y))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn add_keyset(&self, keyset: &MintKeyset) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        inner
            .keysets
            .insert(keyset.keyset_id.clone(), keyset.clone());
        Ok(())
    }

    async fn get_keysets(&self) -> Result<Vec<MintKeyset>, MintError> {
        let inner = self.inner.lock().await;
        Ok(inner.keysets.values().cloned().collect())
    }

    async fn set_keyset_active(&self, keyset_id: &str, active: bool) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        match inner.keysets.get_mut(keyset_id) {
            Some(keyset) => {
                keyset.active = active;
                Ok(())
            }
            None => Err(MintError::KeysetUnknown(keyset_id.to_string())),
        }
    }

    async fn mark_spent(&self, proofs: &[SpentProof]) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        let occupied = inner.occupied_ys(proofs.iter().map(|p| &p.y));
        if !occupied.is_empty() {
            return Err(MintError::TokenAlreadySpent { ys: occupied });
        }
        for proof in proofs {
            inner.spent_proofs.insert(proof.y.clone(), proof.clone());
        }
        Ok(())
    }

    async fn mark_pending(&self, proofs: &[PendingProof]) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        let occupied = inner.occupied_ys(proofs.iter().map(|p| &p.y));
        if !occupied.is_empty() {
            return Err(MintError::TokenAlreadySpent { ys: occupied });
        }
        for proof in proofs {
            inner.pending_proofs.insert(proof.y.clone(), proof.clone());
        }
        Ok(())
    }

    async fn promote_pending_to_spent(&self, proofs: &[SpentProof]) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        for proof in proofs {
            inner.pending_proofs.remove(&proof.y);
            inner.spent_proofs.insert(proof.y.clone(), proof.clone());
        }
        Ok(())
    }

    async fn remove_pending(&self, ys: &[String]) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        for y in ys {
            inner.pending_proofs.remove(y);
        }
        Ok(())
    }

    async fn get_pending_proofs_by_quote(
        &self,
        quote_id: &str,
    ) -> Result<Vec<PendingProof>, MintError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .pending_proofs
            .values()
            .filter(|p| p.quote_id.as_deref() == Some(quote_id))
            .cloned()
            .collect())
    }

    async fn proof_states(
        &self,
        ys: &[String],
        now: u64,
    ) -> Result<Vec<ProofStateEntry>, MintError> {
        let inner = self.inner.lock().await;
        Ok(ys
            .iter()
            .map(|y| {
                if let Some(spent) = inner.spent_proofs.get(y) {
                    ProofStateEntry {
                        y: y.clone(),
                        state: ProofState::Spent,
                        witness: spent.witness.clone(),
                    }
                } else if inner
                    .pending_proofs
                    .get(y)
                    .is_some_and(|pending| pending.expires_at >= now)
                {
                    ProofStateEntry {
                        y: y.clone(),
                        state: ProofState::Pending,
                        witness: None,
                    }
                } else {
                    ProofStateEntry {
                        y: y.clone(),
                        state: ProofState::Unspent,
                        witness: None,
                    }
                }
            })
            .collect())
    }

    async fn sweep_expired_pending(&self, now: u64) -> Result<u64, MintError> {
        let mut inner = self.inner.lock().await;
        let before = inner.pending_proofs.len();
        inner.pending_proofs.retain(|_, p| p.expires_at >= now);
        Ok((before - inner.pending_proofs.len()) as u64)
    }

    async fn add_mint_quote(&self, quote: &MintQuote) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        if inner.mint_quotes.contains_key(&quote.quote_id) {
            return Err(MintError::InvalidRequest("quote id collision".to_string()));
        }
        inner
            .mint_quotes
            .insert(quote.quote_id.clone(), quote.clone());
        Ok(())
    }

    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, MintError> {
        let inner = self.inner.lock().await;
        Ok(inner.mint_quotes.get(quote_id).cloned())
    }

    async fn mark_mint_quote_paid(&self, quote_id: &str) -> Result<bool, MintError> {
        let mut inner = self.inner.lock().await;
        match inner.mint_quotes.get_mut(quote_id) {
            Some(quote) if quote.state == MintQuoteState::Unpaid => {
                quote.state = MintQuoteState::Paid;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_mint_quote_issued(
        &self,
        quote_id: &str,
        issued_at: u64,
    ) -> Result<bool, MintError> {
        let mut inner = self.inner.lock().await;
        match inner.mint_quotes.get_mut(quote_id) {
            Some(quote) if quote.state == MintQuoteState::Paid => {
                quote.state = MintQuoteState::Issued;
                quote.issued_at = Some(issued_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_expired_mint_quotes(&self, now: u64) -> Result<u64, MintError> {
        let mut inner = self.inner.lock().await;
        let before = inner.mint_quotes.len();
        inner
            .mint_quotes
            .retain(|_, q| q.state != MintQuoteState::Unpaid || q.expiry >= now);
        Ok((before - inner.mint_quotes.len()) as u64)
    }

    async fn add_melt_quote(&self, quote: &MeltQuote) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        if inner.melt_quotes.contains_key(&quote.quote_id) {
            return Err(MintError::InvalidRequest("quote id collision".to_string()));
        }
        inner
            .melt_quotes
            .insert(quote.quote_id.clone(), quote.clone());
        Ok(())
    }

    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<MeltQuote>, MintError> {
        let inner = self.inner.lock().await;
        Ok(inner.melt_quotes.get(quote_id).cloned())
    }

    async fn set_melt_quote_state(
        &self,
        quote_id: &str,
        expected: MeltQuoteState,
        new_state: MeltQuoteState,
    ) -> Result<bool, MintError> {
        let mut inner = self.inner.lock().await;
        match inner.melt_quotes.get_mut(quote_id) {
            Some(quote) if quote.state == expected => {
                quote.state = new_state;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_melt_quote_paid(
        &self,
        quote_id: &str,
        payment_preimage: Option<&str>,
        fee_paid: Option<u64>,
    ) -> Result<bool, MintError> {
        let mut inner = self.inner.lock().await;
        match inner.melt_quotes.get_mut(quote_id) {
            Some(quote) if quote.state == MeltQuoteState::Pending => {
                quote.state = MeltQuoteState::Paid;
                quote.payment_preimage = payment_preimage.map(|p| p.to_string());
                quote.fee_paid = fee_paid;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_pending_melt_quotes(&self) -> Result<Vec<MeltQuote>, MintError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .melt_quotes
            .values()
            .filter(|q| q.state == MeltQuoteState::Pending)
            .cloned()
            .collect())
    }

    async fn delete_expired_melt_quotes(&self, now: u64) -> Result<u64, MintError> {
        let mut inner = self.inner.lock().await;
        let before = inner.melt_quotes.len();
        inner
            .melt_quotes
            .retain(|_, q| q.state != MeltQuoteState::Unpaid || q.expiry >= now);
        Ok((before - inner.melt_quotes.len()) as u64)
    }

    async fn add_blind_signatures(
        &self,
        records: &[BlindSignatureRecord],
    ) -> Result<(), MintError> {
        let mut inner = self.inner.lock().await;
        if records
            .iter()
            .any(|r| inner.blind_signatures.contains_key(&r.b_))
        {
            return Err(MintError::BlindedMessageAlreadySigned);
        }
        for record in records {
            inner
                .blind_signatures
                .insert(record.b_.clone(), record.clone());
        }
        Ok(())
    }

    async fn get_blind_signatures(
        &self,
        bs: &[String],
    ) -> Result<Vec<Option<BlindSignatureRecord>>, MintError> {
        let inner = self.inner.lock().await;
        Ok(bs
            .iter()
            .map(|b| inner.blind_signatures.get(b).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use gild_core::primitives::{MeltQuoteState, MintQuoteState, ProofState};
    use pretty_assertions::assert_eq;

    use super::MemoryDatabase;
    use crate::database::Database;
    use crate::error::MintError;
    use crate::model::{MeltQuote, MintQuote, PendingProof, SpentProof};

    fn spent(y: &str) -> SpentProof {
        SpentProof {
            y: y.to_string(),
            keyset_id: "009a1f293253e41e".to_string(),
            amount: 4,
            witness: None,
            spent_at: 100,
        }
    }

    fn pending(y: &str, expires_at: u64) -> PendingProof {
        PendingProof {
            y: y.to_string(),
            keyset_id: "009a1f293253e41e".to_string(),
            amount: 4,
            quote_id: Some("quote".to_string()),
            created_at: 100,
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_mark_spent_rejects_double_insert() -> anyhow::Result<()> {
        let db = MemoryDatabase::new();
        db.mark_spent(&[spent("y1"), spent("y2")]).await?;

        // the batch fails atomically and reports the offending y
        let result = db.mark_spent(&[spent("y3"), spent("y1")]).await;
        match result {
            Err(MintError::TokenAlreadySpent { ys }) => assert_eq!(ys, vec!["y1".to_string()]),
            other => panic!("expected TokenAlreadySpent, got {other:?}"),
        }

        let states = db
            .proof_states(&["y3".to_string()], 100)
            .await?;
        assert_eq!(states[0].state, ProofState::Unspent);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_blocks_spent_and_vice_versa() -> anyhow::Result<()> {
        let db = MemoryDatabase::new();
        db.mark_pending(&[pending("y1", 1000)]).await?;

        assert!(db.mark_spent(&[spent("y1")]).await.is_err());
        assert!(db.mark_pending(&[pending("y1", 1000)]).await.is_err());

        db.mark_spent(&[spent("y2")]).await?;
        assert!(db.mark_pending(&[pending("y2", 1000)]).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_promote_pending_to_spent() -> anyhow::Result<()> {
        let db = MemoryDatabase::new();
        db.mark_pending(&[pending("y1", 1000)]).await?;
        db.promote_pending_to_spent(&[spent("y1")]).await?;

        let states = db.proof_states(&["y1".to_string()], 100).await?;
        assert_eq!(states[0].state, ProofState::Spent);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_pending_reports_unspent_and_sweeps() -> anyhow::Result<()> {
        let db = MemoryDatabase::new();
        db.mark_pending(&[pending("y1", 50), pending("y2", 1000)])
            .await?;

        let states = db
            .proof_states(&["y1".to_string(), "y2".to_string()], 100)
            .await?;
        assert_eq!(states[0].state, ProofState::Unspent);
        assert_eq!(states[1].state, ProofState::Pending);

        assert_eq!(db.sweep_expired_pending(100).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_quote_state_machine() -> anyhow::Result<()> {
        let db = MemoryDatabase::new();
        let quote = MintQuote {
            quote_id: "q1".to_string(),
            unit: gild_core::primitives::CurrencyUnit::Sat,
            amount: 100,
            request: "lnbc...".to_string(),
            payment_hash: "hash".to_string(),
            state: MintQuoteState::Unpaid,
            expiry: 1000,
            issued_at: None,
        };
        db.add_mint_quote(&quote).await?;

        // issuing before payment must lose the CAS
        assert!(!db.mark_mint_quote_issued("q1", 1).await?);
        assert!(db.mark_mint_quote_paid("q1").await?);
        // the paid transition is not repeatable
        assert!(!db.mark_mint_quote_paid("q1").await?);
        assert!(db.mark_mint_quote_issued("q1", 1).await?);
        assert!(!db.mark_mint_quote_issued("q1", 1).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_melt_quote_cas() -> anyhow::Result<()> {
        let db = MemoryDatabase::new();
        let quote = MeltQuote {
            quote_id: "m1".to_string(),
            unit: gild_core::primitives::CurrencyUnit::Sat,
            amount: 100,
            request: "lnbc...".to_string(),
            fee_reserve: 2,
            state: MeltQuoteState::Unpaid,
            payment_preimage: None,
            fee_paid: None,
            expiry: 1000,
            mpp_amount_msat: None,
        };
        db.add_melt_quote(&quote).await?;

        assert!(
            db.set_melt_quote_state("m1", MeltQuoteState::Unpaid, MeltQuoteState::Pending)
                .await?
        );
        // a second concurrent melt loses the CAS
        assert!(
            !db.set_melt_quote_state("m1", MeltQuoteState::Unpaid, MeltQuoteState::Pending)
                .await?
        );

        assert!(db.mark_melt_quote_paid("m1", Some("preimage"), Some(3)).await?);
        let stored = db.get_melt_quote("m1").await?.expect("quote exists");
        assert_eq!(stored.state, MeltQuoteState::Paid);
        assert_eq!(stored.fee_paid, Some(3));
        Ok(())
    }
}
