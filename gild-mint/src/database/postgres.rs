//! Postgres store. All multi-row writes run in a transaction; double-spend
//! defense rests on the primary key of the `proof_ys` registry, which every
//! `spent_proofs` and `pending_proofs` row writes through in the same
//! transaction. The single registry is what makes the uniqueness of a `y`
//! hold across both namespaces under concurrent writers.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use gild_core::dhke::public_key_from_hex;
use gild_core::keyset::MintKeyset;
use gild_core::primitives::{
    CurrencyUnit, MeltQuoteState, MintQuoteState, ProofState, ProofStateEntry,
};
use secp256k1::SecretKey;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use tracing::instrument;

use super::Database;
use crate::config::DatabaseConfig;
use crate::error::MintError;
use crate::model::{BlindSignatureRecord, MeltQuote, MintQuote, PendingProof, SpentProof};

#[derive(Clone)]
pub struct PostgresDB {
    pool: sqlx::Pool<sqlx::Postgres>,
    migrations_path: String,
}

impl PostgresDB {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        Ok(Self {
            pool: PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(config.db_url.as_str())
                .await?,
            migrations_path: config.migrations_path.clone(),
        })
    }

    pub async fn migrate(&self) -> Result<(), MintError> {
        let migrator = sqlx::migrate::Migrator::new(Path::new(&self.migrations_path))
            .await
            .map_err(|err| MintError::Db(err.into()))?;
        migrator
            .run(&self.pool)
            .await
            .map_err(|err| MintError::Db(err.into()))
    }

    /// `Y`s already registered by either proof namespace.
    async fn occupied_ys<'e, E>(executor: E, ys: &[String]) -> Result<Vec<String>, MintError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query("SELECT y FROM proof_ys WHERE y = ANY($1)")
            .bind(ys.to_vec())
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("y")).collect())
    }

    /// Maps a failed registry or row insert: a unique violation is a double
    /// spend and reports the `Y`s that were already taken.
    async fn double_spend_error(&self, ys: &[String], err: sqlx::Error) -> MintError {
        if is_unique_violation(&err) {
            match Self::occupied_ys(&self.pool, ys).await {
                Ok(occupied) => MintError::TokenAlreadySpent { ys: occupied },
                Err(db_err) => db_err,
            }
        } else {
            err.into()
        }
    }
}

fn unit_to_string(unit: &CurrencyUnit) -> String {
    unit.to_string()
}

fn unit_from_string(unit: &str) -> Result<CurrencyUnit, MintError> {
    match unit {
        "sat" => Ok(CurrencyUnit::Sat),
        "msat" => Ok(CurrencyUnit::Msat),
        "usd" => Ok(CurrencyUnit::Usd),
        other => Err(MintError::UnitNotSupported(other.to_string())),
    }
}

fn mint_state_from_string(state: &str) -> Result<MintQuoteState, MintError> {
    match state {
        "UNPAID" => Ok(MintQuoteState::Unpaid),
        "PAID" => Ok(MintQuoteState::Paid),
        "ISSUED" => Ok(MintQuoteState::Issued),
        other => Err(MintError::InvalidRequest(format!(
            "unknown mint quote state {other}"
        ))),
    }
}

fn melt_state_from_string(state: &str) -> Result<MeltQuoteState, MintError> {
    match state {
        "UNPAID" => Ok(MeltQuoteState::Unpaid),
        "PENDING" => Ok(MeltQuoteState::Pending),
        "PAID" => Ok(MeltQuoteState::Paid),
        other => Err(MintError::InvalidRequest(format!(
            "unknown melt quote state {other}"
        ))),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[async_trait]
impl Database for PostgresDB {
    #[instrument(level = "debug", skip_all, err)]
    async fn add_keyset(&self, keyset: &MintKeyset) -> Result<(), MintError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO mint_keysets (keyset_id, unit, active, input_fee_ppk) VALUES ($1, $2, $3, $4)",
        )
        .bind(&keyset.keyset_id)
        .bind(unit_to_string(&keyset.unit))
        .bind(keyset.active)
        .bind(keyset.input_fee_ppk as i64)
        .execute(&mut *tx)
        .await?;

        for (amount, private_key) in &keyset.private_keys {
            let public_key = keyset
                .public_keys
                .get(amount)
                .expect("keypair maps share denominations");
            sqlx::query(
                "INSERT INTO mint_keyset_keys (keyset_id, amount, secret_key, public_key) VALUES ($1, $2, $3, $4)",
            )
            .bind(&keyset.keyset_id)
            .bind(*amount as i64)
            .bind(private_key.display_secret().to_string())
            .bind(public_key.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn get_keysets(&self) -> Result<Vec<MintKeyset>, MintError> {
        let keyset_rows = sqlx::query(
            "SELECT keyset_id, unit, active, input_fee_ppk FROM mint_keysets ORDER BY keyset_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let key_rows = sqlx::query(
            "SELECT keyset_id, amount, secret_key, public_key FROM mint_keyset_keys",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut private_keys: HashMap<String, BTreeMap<u64, SecretKey>> = HashMap::new();
        let mut public_keys: HashMap<String, BTreeMap<u64, secp256k1::PublicKey>> = HashMap::new();
        for row in key_rows {
            let keyset_id: String = row.get("keyset_id");
            let amount: i64 = row.get("amount");
            let secret_key = SecretKey::from_str(row.get("secret_key"))
                .map_err(|_| MintError::KeyGenFailed)?;
            let public_key = public_key_from_hex(row.get("public_key"))
                .map_err(|_| MintError::KeyGenFailed)?;
            private_keys
                .entry(keyset_id.clone())
                .or_default()
                .insert(amount as u64, secret_key);
            public_keys
                .entry(keyset_id)
                .or_default()
                .insert(amount as u64, public_key);
        }

        keyset_rows
            .into_iter()
            .map(|row| {
                let keyset_id: String = row.get("keyset_id");
                let unit: String = row.get("unit");
                let input_fee_ppk: i64 = row.get("input_fee_ppk");
                Ok(MintKeyset {
                    private_keys: private_keys.remove(&keyset_id).unwrap_or_default(),
                    public_keys: public_keys.remove(&keyset_id).unwrap_or_default(),
                    unit: unit_from_string(&unit)?,
                    active: row.get("active"),
                    input_fee_ppk: input_fee_ppk as u64,
                    keyset_id,
                })
            })
            .collect()
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn set_keyset_active(&self, keyset_id: &str, active: bool) -> Result<(), MintError> {
        let result = sqlx::query("UPDATE mint_keysets SET active = $1 WHERE keyset_id = $2")
            .bind(active)
            .bind(keyset_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MintError::KeysetUnknown(keyset_id.to_string()));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn mark_spent(&self, proofs: &[SpentProof]) -> Result<(), MintError> {
        let ys: Vec<String> = proofs.iter().map(|p| p.y.clone()).collect();
        let mut tx = self.pool.begin().await?;

        let occupied = Self::occupied_ys(&mut *tx, &ys).await?;
        if !occupied.is_empty() {
            return Err(MintError::TokenAlreadySpent { ys: occupied });
        }

        for proof in proofs {
            // the registry insert is the authority across both the spent and
            // pending namespaces; the pre-select above is an optimization
            // that can lose a race
            if let Err(err) = sqlx::query("INSERT INTO proof_ys (y) VALUES ($1)")
                .bind(&proof.y)
                .execute(&mut *tx)
                .await
            {
                drop(tx);
                return Err(self.double_spend_error(&ys, err).await);
            }

            if let Err(err) = sqlx::query(
                "INSERT INTO spent_proofs (y, keyset_id, amount, witness, spent_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&proof.y)
            .bind(&proof.keyset_id)
            .bind(proof.amount as i64)
            .bind(&proof.witness)
            .bind(proof.spent_at as i64)
            .execute(&mut *tx)
            .await
            {
                drop(tx);
                return Err(self.double_spend_error(&ys, err).await);
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn mark_pending(&self, proofs: &[PendingProof]) -> Result<(), MintError> {
        let ys: Vec<String> = proofs.iter().map(|p| p.y.clone()).collect();
        let mut tx = self.pool.begin().await?;

        let occupied = Self::occupied_ys(&mut *tx, &ys).await?;
        if !occupied.is_empty() {
            return Err(MintError::TokenAlreadySpent { ys: occupied });
        }

        for proof in proofs {
            // same registry authority as mark_spent: a y that any concurrent
            // writer registered, spent or pending, fails the insert here
            if let Err(err) = sqlx::query("INSERT INTO proof_ys (y) VALUES ($1)")
                .bind(&proof.y)
                .execute(&mut *tx)
                .await
            {
                drop(tx);
                return Err(self.double_spend_error(&ys, err).await);
            }

            if let Err(err) = sqlx::query(
                "INSERT INTO pending_proofs (y, keyset_id, amount, quote_id, created_at, expires_at) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&proof.y)
            .bind(&proof.keyset_id)
            .bind(proof.amount as i64)
            .bind(&proof.quote_id)
            .bind(proof.created_at as i64)
            .bind(proof.expires_at as i64)
            .execute(&mut *tx)
            .await
            {
                drop(tx);
                return Err(self.double_spend_error(&ys, err).await);
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn promote_pending_to_spent(&self, proofs: &[SpentProof]) -> Result<(), MintError> {
        let ys: Vec<String> = proofs.iter().map(|p| p.y.clone()).collect();
        let mut tx = self.pool.begin().await?;

        // the registry rows stay: a promoted y is terminally occupied
        sqlx::query("DELETE FROM pending_proofs WHERE y = ANY($1)")
            .bind(ys)
            .execute(&mut *tx)
            .await?;

        for proof in proofs {
            // re-register idempotently in case the expiry sweeper released
            // the pending row between the payment and this promotion
            sqlx::query("INSERT INTO proof_ys (y) VALUES ($1) ON CONFLICT (y) DO NOTHING")
                .bind(&proof.y)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO spent_proofs (y, keyset_id, amount, witness, spent_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&proof.y)
            .bind(&proof.keyset_id)
            .bind(proof.amount as i64)
            .bind(&proof.witness)
            .bind(proof.spent_at as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn remove_pending(&self, ys: &[String]) -> Result<(), MintError> {
        let mut tx = self.pool.begin().await?;
        let released = sqlx::query("DELETE FROM pending_proofs WHERE y = ANY($1) RETURNING y")
            .bind(ys.to_vec())
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|row| row.get::<String, _>("y"))
            .collect::<Vec<String>>();

        // only ys that were actually pending leave the registry; spent rows
        // keep theirs
        sqlx::query("DELETE FROM proof_ys WHERE y = ANY($1)")
            .bind(released)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn get_pending_proofs_by_quote(
        &self,
        quote_id: &str,
    ) -> Result<Vec<PendingProof>, MintError> {
        let rows = sqlx::query(
            "SELECT y, keyset_id, amount, quote_id, created_at, expires_at FROM pending_proofs WHERE quote_id = $1",
        )
        .bind(quote_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let amount: i64 = row.get("amount");
                let created_at: i64 = row.get("created_at");
                let expires_at: i64 = row.get("expires_at");
                PendingProof {
                    y: row.get("y"),
                    keyset_id: row.get("keyset_id"),
                    amount: amount as u64,
                    quote_id: row.get("quote_id"),
                    created_at: created_at as u64,
                    expires_at: expires_at as u64,
                }
            })
            .collect())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn proof_states(
        &self,
        ys: &[String],
        now: u64,
    ) -> Result<Vec<ProofStateEntry>, MintError> {
        let spent_rows = sqlx::query("SELECT y, witness FROM spent_proofs WHERE y = ANY($1)")
            .bind(ys.to_vec())
            .fetch_all(&self.pool)
            .await?;
        let pending_rows =
            sqlx::query("SELECT y FROM pending_proofs WHERE y = ANY($1) AND expires_at >= $2")
                .bind(ys.to_vec())
                .bind(now as i64)
                .fetch_all(&self.pool)
                .await?;

        let spent: HashMap<String, Option<String>> = spent_rows
            .into_iter()
            .map(|row| (row.get("y"), row.get("witness")))
            .collect();
        let pending: Vec<String> = pending_rows
            .into_iter()
            .map(|row| row.get("y"))
            .collect();

        Ok(ys
            .iter()
            .map(|y| {
                if let Some(witness) = spent.get(y) {
                    ProofStateEntry {
                        y: y.clone(),
                        state: ProofState::Spent,
                        witness: witness.clone(),
                    }
                } else if pending.contains(y) {
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

    #[instrument(level = "debug", skip(self), err)]
    async fn sweep_expired_pending(&self, now: u64) -> Result<u64, MintError> {
        let mut tx = self.pool.begin().await?;
        let released =
            sqlx::query("DELETE FROM pending_proofs WHERE expires_at < $1 RETURNING y")
                .bind(now as i64)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(|row| row.get::<String, _>("y"))
                .collect::<Vec<String>>();

        sqlx::query("DELETE FROM proof_ys WHERE y = ANY($1)")
            .bind(&released)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(released.len() as u64)
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn add_mint_quote(&self, quote: &MintQuote) -> Result<(), MintError> {
        sqlx::query(
            "INSERT INTO mint_quotes (quote_id, unit, amount, request, payment_hash, state, expiry, issued_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&quote.quote_id)
        .bind(unit_to_string(&quote.unit))
        .bind(quote.amount as i64)
        .bind(&quote.request)
        .bind(&quote.payment_hash)
        .bind(quote.state.to_string())
        .bind(quote.expiry as i64)
        .bind(quote.issued_at.map(|t| t as i64))
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                MintError::InvalidRequest("quote id collision".to_string())
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, MintError> {
        let row = sqlx::query(
            "SELECT quote_id, unit, amount, request, payment_hash, state, expiry, issued_at FROM mint_quotes WHERE quote_id = $1",
        )
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let unit: String = row.get("unit");
            let state: String = row.get("state");
            let amount: i64 = row.get("amount");
            let expiry: i64 = row.get("expiry");
            let issued_at: Option<i64> = row.get("issued_at");
            Ok(MintQuote {
                quote_id: row.get("quote_id"),
                unit: unit_from_string(&unit)?,
                amount: amount as u64,
                request: row.get("request"),
                payment_hash: row.get("payment_hash"),
                state: mint_state_from_string(&state)?,
                expiry: expiry as u64,
                issued_at: issued_at.map(|t| t as u64),
            })
        })
        .transpose()
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn mark_mint_quote_paid(&self, quote_id: &str) -> Result<bool, MintError> {
        let result = sqlx::query(
            "UPDATE mint_quotes SET state = 'PAID' WHERE quote_id = $1 AND state = 'UNPAID'",
        )
        .bind(quote_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn mark_mint_quote_issued(
        &self,
        quote_id: &str,
        issued_at: u64,
    ) -> Result<bool, MintError> {
        let result = sqlx::query(
            "UPDATE mint_quotes SET state = 'ISSUED', issued_at = $1 WHERE quote_id = $2 AND state = 'PAID'",
        )
        .bind(issued_at as i64)
        .bind(quote_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn delete_expired_mint_quotes(&self, now: u64) -> Result<u64, MintError> {
        let result =
            sqlx::query("DELETE FROM mint_quotes WHERE state = 'UNPAID' AND expiry < $1")
                .bind(now as i64)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn add_melt_quote(&self, quote: &MeltQuote) -> Result<(), MintError> {
        sqlx::query(
            "INSERT INTO melt_quotes (quote_id, unit, amount, request, fee_reserve, state, payment_preimage, fee_paid, expiry, mpp_amount_msat) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&quote.quote_id)
        .bind(unit_to_string(&quote.unit))
        .bind(quote.amount as i64)
        .bind(&quote.request)
        .bind(quote.fee_reserve as i64)
        .bind(quote.state.to_string())
        .bind(&quote.payment_preimage)
        .bind(quote.fee_paid.map(|f| f as i64))
        .bind(quote.expiry as i64)
        .bind(quote.mpp_amount_msat.map(|m| m as i64))
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                MintError::InvalidRequest("quote id collision".to_string())
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<MeltQuote>, MintError> {
        let row = sqlx::query(
            "SELECT quote_id, unit, amount, request, fee_reserve, state, payment_preimage, fee_paid, expiry, mpp_amount_msat FROM melt_quotes WHERE quote_id = $1",
        )
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(melt_quote_from_row).transpose()
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn set_melt_quote_state(
        &self,
        quote_id: &str,
        expected: MeltQuoteState,
        new_state: MeltQuoteState,
    ) -> Result<bool, MintError> {
        let result =
            sqlx::query("UPDATE melt_quotes SET state = $1 WHERE quote_id = $2 AND state = $3")
                .bind(new_state.to_string())
                .bind(quote_id)
                .bind(expected.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn mark_melt_quote_paid(
        &self,
        quote_id: &str,
        payment_preimage: Option<&str>,
        fee_paid: Option<u64>,
    ) -> Result<bool, MintError> {
        let result = sqlx::query(
            "UPDATE melt_quotes SET state = 'PAID', payment_preimage = $1, fee_paid = $2 WHERE quote_id = $3 AND state = 'PENDING'",
        )
        .bind(payment_preimage)
        .bind(fee_paid.map(|f| f as i64))
        .bind(quote_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn get_pending_melt_quotes(&self) -> Result<Vec<MeltQuote>, MintError> {
        let rows = sqlx::query(
            "SELECT quote_id, unit, amount, request, fee_reserve, state, payment_preimage, fee_paid, expiry, mpp_amount_msat FROM melt_quotes WHERE state = 'PENDING'",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(melt_quote_from_row).collect()
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn delete_expired_melt_quotes(&self, now: u64) -> Result<u64, MintError> {
        let result =
            sqlx::query("DELETE FROM melt_quotes WHERE state = 'UNPAID' AND expiry < $1")
                .bind(now as i64)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn add_blind_signatures(
        &self,
        records: &[BlindSignatureRecord],
    ) -> Result<(), MintError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO blind_signatures (b, keyset_id, amount, c, dleq_e, dleq_s) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&record.b_)
            .bind(&record.keyset_id)
            .bind(record.amount as i64)
            .bind(&record.c_)
            .bind(&record.dleq_e)
            .bind(&record.dleq_s)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    MintError::BlindedMessageAlreadySigned
                } else {
                    MintError::Db(err)
                }
            })?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn get_blind_signatures(
        &self,
        bs: &[String],
    ) -> Result<Vec<Option<BlindSignatureRecord>>, MintError> {
        let rows = sqlx::query(
            "SELECT b, keyset_id, amount, c, dleq_e, dleq_s FROM blind_signatures WHERE b = ANY($1)",
        )
        .bind(bs.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let found: HashMap<String, BlindSignatureRecord> = rows
            .into_iter()
            .map(|row| {
                let amount: i64 = row.get("amount");
                let record = BlindSignatureRecord {
                    b_: row.get("b"),
                    keyset_id: row.get("keyset_id"),
                    amount: amount as u64,
                    c_: row.get("c"),
                    dleq_e: row.get("dleq_e"),
                    dleq_s: row.get("dleq_s"),
                };
                (record.b_.clone(), record)
            })
            .collect();

        Ok(bs.iter().map(|b| found.get(b).cloned()).collect())
    }
}

fn melt_quote_from_row(row: sqlx::postgres::PgRow) -> Result<MeltQuote, MintError> {
    let unit: String = row.get("unit");
    let state: String = row.get("state");
    let amount: i64 = row.get("amount");
    let fee_reserve: i64 = row.get("fee_reserve");
    let fee_paid: Option<i64> = row.get("fee_paid");
    let expiry: i64 = row.get("expiry");
    let mpp_amount_msat: Option<i64> = row.get("mpp_amount_msat");
    Ok(MeltQuote {
        quote_id: row.get("quote_id"),
        unit: unit_from_string(&unit)?,
        amount: amount as u64,
        request: row.get("request"),
        fee_reserve: fee_reserve as u64,
        state: melt_state_from_string(&state)?,
        payment_preimage: row.get("payment_preimage"),
        fee_paid: fee_paid.map(|f| f as u64),
        expiry: expiry as u64,
        mpp_amount_msat: mpp_amount_msat.map(|m| m as u64),
    })
}
