use arrow::array::{ArrayRef, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult, Transactional};
use sled::Db;
use std::path::Path;
use std::sync::Arc;

use crate::models::{Risk, Role, StrategicObjective, Submission, User};

/// Attempts at claiming a fresh risk id before giving up. Collisions only happen
/// when ids were written without going through the counter (imports, seeds).
const RISK_ID_ATTEMPTS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("arrow projection error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("user with email {0} already exists")]
    DuplicateEmail(String),
    #[error("risk {0} already exists")]
    DuplicateRiskId(String),
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("risk {0} not found")]
    RiskNotFound(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Document store over Sled. Each collection is a tree of serde-JSON documents:
/// - `users`: user id -> User
/// - `user_emails`: lower-cased email -> user id (uniqueness index)
/// - `risks`: risk id -> Risk
/// - `risk_counters`: objective letter -> last issued sequence number (u64 BE)
/// - `submissions`: submission id -> Submission
#[derive(Clone)] // Sled handles are reference counted; clones share the same database
pub struct Storage {
    db: Db,
    users: sled::Tree,
    user_emails: sled::Tree,
    risks: sled::Tree,
    risk_counters: sled::Tree,
    submissions: sled::Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop.
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            user_emails: db.open_tree("user_emails")?,
            risks: db.open_tree("risks")?,
            risk_counters: db.open_tree("risk_counters")?,
            submissions: db.open_tree("submissions")?,
            db,
        })
    }

    pub async fn flush(&self) -> StorageResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    // --- Users ---

    /// Insert a new user. The email index entry and the user document are written in
    /// one transaction, so either both land or neither does. An index entry whose
    /// user document is missing does not count as taken.
    pub fn create_user(&self, user: &User) -> StorageResult<()> {
        let email = user.email.to_ascii_lowercase();
        let doc = encode(user)?;
        let result: TransactionResult<(), StorageError> =
            (&self.users, &self.user_emails).transaction(|(users, emails)| {
                if let Some(owner) = emails.get(email.as_bytes())? {
                    if users.get(&owner)?.is_some() {
                        return Err(ConflictableTransactionError::Abort(StorageError::DuplicateEmail(
                            email.clone(),
                        )));
                    }
                }
                emails.insert(email.as_bytes(), user.id.as_bytes())?;
                users.insert(user.id.as_bytes(), doc.as_slice())?;
                Ok(())
            });
        result.map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StorageError::Sled(err),
        })?;
        tracing::debug!(user_id = %user.id, role = %user.role, "user created");
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StorageResult<Option<User>> {
        get_doc(&self.users, id)
    }

    pub fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let key = email.trim().to_ascii_lowercase();
        match self.user_emails.get(key.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8(id.to_vec())
                    .map_err(|_| StorageError::Corrupt(format!("email index entry for {}", key)))?;
                self.get_user(&id)
            }
            None => Ok(None),
        }
    }

    /// Replace an existing user document. Email is immutable through this path.
    pub fn update_user(&self, user: &User) -> StorageResult<()> {
        if !self.users.contains_key(user.id.as_bytes())? {
            return Err(StorageError::UserNotFound(user.id.clone()));
        }
        self.users.insert(user.id.as_bytes(), encode(user)?)?;
        Ok(())
    }

    pub fn list_users(&self) -> StorageResult<Vec<User>> {
        scan(&self.users)
    }

    pub fn list_users_by_role(&self, role: Role) -> StorageResult<Vec<User>> {
        let mut users: Vec<User> = self.list_users()?.into_iter().filter(|u| u.role == role).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    // --- Risks ---

    /// Issue the next identifier under an objective letter: `<letter><n>`.
    /// The per-letter counter is bumped atomically, so concurrent callers never
    /// receive the same number.
    pub fn next_risk_id(&self, objective: StrategicObjective) -> StorageResult<String> {
        let letter = objective.letter().to_string();
        let updated = self.risk_counters.update_and_fetch(letter.as_bytes(), increment)?;
        let seq = match updated {
            Some(bytes) => decode_counter(&bytes)?,
            None => return Err(StorageError::Corrupt(format!("counter for {}", letter))),
        };
        Ok(format!("{}{}", letter, seq))
    }

    /// Register a risk under a freshly issued id. `build` receives the id and returns
    /// the document to store; it is called again if the id turns out to be taken.
    pub fn register_risk<F>(&self, objective: StrategicObjective, mut build: F) -> StorageResult<Risk>
    where
        F: FnMut(String) -> Risk,
    {
        for _ in 0..RISK_ID_ATTEMPTS {
            let risk_id = self.next_risk_id(objective)?;
            let risk = build(risk_id);
            match self.insert_risk(&risk) {
                Ok(()) => return Ok(risk),
                Err(StorageError::DuplicateRiskId(id)) => {
                    tracing::warn!(risk_id = %id, "risk id already taken, issuing another");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::Corrupt(format!(
            "no free risk id under {} after {} attempts",
            objective, RISK_ID_ATTEMPTS
        )))
    }

    /// Insert a risk, refusing to overwrite an existing id.
    pub fn insert_risk(&self, risk: &Risk) -> StorageResult<()> {
        let swapped = self.risks.compare_and_swap(
            risk.risk_id.as_bytes(),
            None as Option<&[u8]>,
            Some(encode(risk)?),
        )?;
        swapped.map_err(|_| StorageError::DuplicateRiskId(risk.risk_id.clone()))
    }

    pub fn get_risk(&self, risk_id: &str) -> StorageResult<Option<Risk>> {
        get_doc(&self.risks, risk_id)
    }

    pub fn update_risk(&self, risk: &Risk) -> StorageResult<()> {
        if !self.risks.contains_key(risk.risk_id.as_bytes())? {
            return Err(StorageError::RiskNotFound(risk.risk_id.clone()));
        }
        self.risks.insert(risk.risk_id.as_bytes(), encode(risk)?)?;
        Ok(())
    }

    /// All risks, newest first.
    pub fn list_risks(&self) -> StorageResult<Vec<Risk>> {
        let mut risks: Vec<Risk> = scan(&self.risks)?;
        risks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(risks)
    }

    // --- Submissions ---

    pub fn insert_submission(&self, submission: &Submission) -> StorageResult<()> {
        self.submissions.insert(submission.id.as_bytes(), encode(submission)?)?;
        Ok(())
    }

    /// All submissions, newest first.
    pub fn list_submissions(&self) -> StorageResult<Vec<Submission>> {
        let mut submissions: Vec<Submission> = scan(&self.submissions)?;
        submissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(submissions)
    }

    /// Project submission documents into an Arrow RecordBatch so DataFusion can run
    /// grouping queries over them. Only the dimensions used by analytics are kept.
    pub fn project_submissions_to_arrow(&self) -> StorageResult<RecordBatch> {
        let submissions: Vec<Submission> = scan(&self.submissions)?;

        let mut ids = Vec::with_capacity(submissions.len());
        let mut risk_ids = Vec::with_capacity(submissions.len());
        let mut units = Vec::with_capacity(submissions.len());
        let mut severities = Vec::with_capacity(submissions.len());
        let mut years = Vec::with_capacity(submissions.len());
        let mut quarters = Vec::with_capacity(submissions.len());
        let mut created_years = Vec::with_capacity(submissions.len());
        let mut created_months = Vec::with_capacity(submissions.len());

        for s in submissions {
            created_years.push(s.created_at.year());
            created_months.push(s.created_at.month() as i32);
            severities.push(s.severity.label().to_string());
            ids.push(s.id);
            risk_ids.push(s.risk_id);
            units.push(s.unit_id);
            years.push(s.year);
            quarters.push(s.time_period);
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("risk_id", DataType::Utf8, false),
            Field::new("unit_id", DataType::Utf8, false),
            Field::new("severity", DataType::Utf8, false),
            Field::new("report_year", DataType::Utf8, false),
            Field::new("report_quarter", DataType::Utf8, false),
            Field::new("created_year", DataType::Int32, false),
            Field::new("created_month", DataType::Int32, false),
        ]));

        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)) as ArrayRef,
                Arc::new(StringArray::from(risk_ids)) as ArrayRef,
                Arc::new(StringArray::from(units)) as ArrayRef,
                Arc::new(StringArray::from(severities)) as ArrayRef,
                Arc::new(StringArray::from(years)) as ArrayRef,
                Arc::new(StringArray::from(quarters)) as ArrayRef,
                Arc::new(Int32Array::from(created_years)) as ArrayRef,
                Arc::new(Int32Array::from(created_months)) as ArrayRef,
            ],
        )?)
    }
}

fn encode<T: Serialize>(doc: &T) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(doc)?)
}

fn get_doc<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> StorageResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(tree: &sled::Tree) -> StorageResult<Vec<T>> {
    let mut docs = vec![];
    for item in tree.iter() {
        let (_, value) = item?;
        docs.push(serde_json::from_slice(&value)?);
    }
    Ok(docs)
}

fn increment(old: Option<&[u8]>) -> Option<Vec<u8>> {
    let current = old
        .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0);
    Some((current + 1).to_be_bytes().to_vec())
}

fn decode_counter(bytes: &[u8]) -> StorageResult<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| StorageError::Corrupt("risk counter is not 8 bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TargetAchievement, TargetStatus};
    use crate::scoring::Severity;
    use arrow::array::Array;
    use chrono::Utc;
    use std::collections::HashSet;

    fn user(id: &str, email: &str, role: Role) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            first_name: "Asha".to_string(),
            last_name: "Mushi".to_string(),
            email: email.to_string(),
            password_hash: "$2b$04$notarealhash".to_string(),
            role,
            unit_id: Some("CoET".to_string()),
            phone: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn risk(risk_id: String, objective: StrategicObjective) -> Risk {
        let now = Utc::now();
        Risk {
            risk_id,
            title: "Delayed procurement".to_string(),
            strategic_objective: objective,
            description: None,
            principal_owner: Some("PMU".to_string()),
            supporting_owners: vec![],
            category: None,
            likelihood: 3,
            impact: 4,
            rating: 12,
            severity: Severity::High,
            causes: None,
            consequences: None,
            existing_controls: None,
            proposed_mitigation: None,
            targets: vec![],
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn submission(id: &str, unit: &str, severity: Severity) -> Submission {
        Submission {
            id: id.to_string(),
            risk_id: "A1".to_string(),
            risk_title: "Delayed procurement".to_string(),
            strategic_objective: StrategicObjective::A,
            time_period: "Q1".to_string(),
            year: "2025".to_string(),
            principal_owner: None,
            supporting_owner: None,
            unit_id: unit.to_string(),
            severity,
            likelihood: 2,
            impact: 2,
            rating: 4,
            targets: vec![TargetAchievement {
                target: "Publish plan".to_string(),
                achievement: "Draft ready".to_string(),
                status: TargetStatus::PartiallyImplemented,
            }],
            submitted_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_email_is_unique_case_insensitively() {
        let storage = Storage::open_temporary().expect("temp storage");
        storage.create_user(&user("u1", "asha@udsm.ac.tz", Role::Champion)).unwrap();
        let dup = storage.create_user(&user("u2", "ASHA@udsm.ac.tz", Role::Champion));
        assert!(matches!(dup, Err(StorageError::DuplicateEmail(_))));

        let found = storage.get_user_by_email("Asha@UDSM.ac.tz").unwrap().expect("by email");
        assert_eq!(found.id, "u1");
        assert!(storage.get_user("u2").unwrap().is_none());
    }

    #[test]
    fn test_stale_email_entry_does_not_block_registration() {
        let storage = Storage::open_temporary().unwrap();
        storage.user_emails.insert("ghost@udsm.ac.tz", "missing-user").unwrap();
        assert!(storage.get_user_by_email("ghost@udsm.ac.tz").unwrap().is_none());

        storage.create_user(&user("u9", "ghost@udsm.ac.tz", Role::Champion)).unwrap();
        let found = storage.get_user_by_email("GHOST@udsm.ac.tz").unwrap().unwrap();
        assert_eq!(found.id, "u9");
    }

    #[test]
    fn test_concurrent_same_email_writes_one_user() {
        let storage = Storage::open_temporary().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    storage
                        .create_user(&user(&format!("racer-{}", i), "race@udsm.ac.tz", Role::Champion))
                        .is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(winners, 1);

        let users = storage.list_users().unwrap();
        assert_eq!(users.len(), 1);
        let indexed = storage.get_user_by_email("race@udsm.ac.tz").unwrap().unwrap();
        assert_eq!(indexed.id, users[0].id);
    }

    #[test]
    fn test_update_unknown_user_fails() {
        let storage = Storage::open_temporary().unwrap();
        let err = storage.update_user(&user("ghost", "g@x.y", Role::Admin)).unwrap_err();
        assert!(matches!(err, StorageError::UserNotFound(_)));
    }

    #[test]
    fn test_sequential_risk_ids_increment_per_letter() {
        let storage = Storage::open_temporary().unwrap();
        let a1 = storage.register_risk(StrategicObjective::A, |id| risk(id, StrategicObjective::A)).unwrap();
        let a2 = storage.register_risk(StrategicObjective::A, |id| risk(id, StrategicObjective::A)).unwrap();
        let b1 = storage.register_risk(StrategicObjective::B, |id| risk(id, StrategicObjective::B)).unwrap();
        assert_eq!(a1.risk_id, "A1");
        assert_eq!(a2.risk_id, "A2");
        assert_eq!(b1.risk_id, "B1");
        assert_eq!(storage.list_risks().unwrap().len(), 3);
    }

    #[test]
    fn test_register_skips_ids_taken_outside_the_counter() {
        let storage = Storage::open_temporary().unwrap();
        storage.insert_risk(&risk("C1".to_string(), StrategicObjective::C)).unwrap();
        let next = storage.register_risk(StrategicObjective::C, |id| risk(id, StrategicObjective::C)).unwrap();
        assert_eq!(next.risk_id, "C2");
        let dup = storage.insert_risk(&risk("C1".to_string(), StrategicObjective::C));
        assert!(matches!(dup, Err(StorageError::DuplicateRiskId(_))));
    }

    #[test]
    fn test_concurrent_registrations_get_distinct_ids() {
        let storage = Storage::open_temporary().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| {
                            storage
                                .register_risk(StrategicObjective::D, |id| risk(id, StrategicObjective::D))
                                .unwrap()
                                .risk_id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id.clone()), "duplicate id {}", id);
            }
        }
        assert_eq!(ids.len(), 80);
        assert!(ids.contains("D1") && ids.contains("D80"));
    }

    #[test]
    fn test_submissions_projection() {
        let storage = Storage::open_temporary().unwrap();
        let empty = storage.project_submissions_to_arrow().unwrap();
        assert_eq!(empty.num_rows(), 0);

        storage.insert_submission(&submission("s1", "CoET", Severity::High)).unwrap();
        storage.insert_submission(&submission("s2", "DoF", Severity::Low)).unwrap();
        let batch = storage.project_submissions_to_arrow().unwrap();
        assert_eq!(batch.num_rows(), 2);
        let severity = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(severity.len(), 2);
        assert!(severity.iter().any(|v| v == Some("High")));
        assert_eq!(storage.list_submissions().unwrap().len(), 2);
    }
}
