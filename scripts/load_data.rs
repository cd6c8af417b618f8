//! Seed script for the risk register.
//!
//! Populates the Sled store with demo accounts (admin, coordinator, two champions),
//! a handful of risks across the strategic objectives, and quarterly submissions
//! against them, then prints the committee severity distribution.
//! Run: cargo run --bin load_data   (uses RMIS_DATA_DIR, default rmis_data)

use chrono::Utc;
use risk_compass::auth::{hash_password, DEFAULT_COST};
use risk_compass::config::Config;
use risk_compass::logging;
use risk_compass::models::{
    Risk, RiskCategory, Role, StrategicObjective, Submission, TargetAchievement, TargetStatus, User,
};
use risk_compass::query::QueryEngine;
use risk_compass::scoring::assess;
use risk_compass::storage::{Storage, StorageError};
use tracing::info;
use uuid::Uuid;

const DEMO_PASSWORD: &str = "password123";

struct SeedRisk {
    objective: StrategicObjective,
    title: &'static str,
    category: RiskCategory,
    principal_owner: &'static str,
    supporting_owners: &'static [&'static str],
    likelihood: i64,
    impact: i64,
}

const RISKS: &[SeedRisk] = &[
    SeedRisk {
        objective: StrategicObjective::A,
        title: "Rising prevalence of non-communicable diseases among staff",
        category: RiskCategory::HealthSafetyAndWelfare,
        principal_owner: "DUHS",
        supporting_owners: &["DHRM"],
        likelihood: 3,
        impact: 4,
    },
    SeedRisk {
        objective: StrategicObjective::B,
        title: "Procurement fraud",
        category: RiskCategory::FraudAndCorruption,
        principal_owner: "PMU",
        supporting_owners: &["DoF", "Internal Audit"],
        likelihood: 2,
        impact: 5,
    },
    SeedRisk {
        objective: StrategicObjective::D,
        title: "Decline in external research funding",
        category: RiskCategory::ResearchAndConsultancy,
        principal_owner: "DRP",
        supporting_owners: &["CoET", "CoNAS"],
        likelihood: 4,
        impact: 5,
    },
    SeedRisk {
        objective: StrategicObjective::G,
        title: "Prolonged ICT service outages",
        category: RiskCategory::Ict,
        principal_owner: "DICT",
        supporting_owners: &["CoET"],
        likelihood: 2,
        impact: 2,
    },
];

fn user(email: &str, first: &str, last: &str, role: Role, unit: Option<&str>) -> Result<User, bcrypt::BcryptError> {
    let now = Utc::now();
    Ok(User {
        id: Uuid::new_v4().to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: email.to_string(),
        password_hash: hash_password(DEMO_PASSWORD, DEFAULT_COST)?,
        role,
        unit_id: unit.map(str::to_string),
        phone: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

type SeedResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Register the sample risks and their quarterly submissions. A store that already
/// holds risks is left untouched so reruns do not duplicate the register.
fn seed_register(storage: &Storage, created_by: Option<String>) -> SeedResult<Vec<Risk>> {
    let existing = storage.list_risks()?.len();
    if existing > 0 {
        info!(existing, "risk register already seeded, skipping risks and submissions");
        return Ok(vec![]);
    }

    let mut registered = vec![];
    for seed in RISKS {
        let assessment = assess(seed.likelihood, seed.impact)?;
        let now = Utc::now();
        let risk = storage.register_risk(seed.objective, |risk_id| Risk {
            risk_id,
            title: seed.title.to_string(),
            strategic_objective: seed.objective,
            description: None,
            principal_owner: Some(seed.principal_owner.to_string()),
            supporting_owners: seed.supporting_owners.iter().map(|s| s.to_string()).collect(),
            category: Some(seed.category),
            likelihood: assessment.likelihood,
            impact: assessment.impact,
            rating: assessment.rating,
            severity: assessment.severity,
            causes: None,
            consequences: None,
            existing_controls: None,
            proposed_mitigation: None,
            targets: vec!["Reduce exposure by year end".to_string()],
            created_by: created_by.clone(),
            created_at: now,
            updated_at: now,
        })?;
        info!(risk_id = %risk.risk_id, severity = %risk.severity, "seeded risk");
        registered.push(risk);
    }

    // One report per quarter for each risk, with the likelihood easing over the year.
    for risk in &registered {
        let unit = risk.supporting_owners.first().cloned().unwrap_or_else(|| "DPDI".to_string());
        for (q, quarter) in ["Q1", "Q2", "Q3", "Q4"].iter().enumerate() {
            let likelihood = (risk.likelihood as i64 - q as i64 / 2).max(1);
            let assessment = assess(likelihood, risk.impact as i64)?;
            let submission = Submission {
                id: Uuid::new_v4().to_string(),
                risk_id: risk.risk_id.clone(),
                risk_title: risk.title.clone(),
                strategic_objective: risk.strategic_objective,
                time_period: quarter.to_string(),
                year: "2025".to_string(),
                principal_owner: risk.principal_owner.clone(),
                supporting_owner: Some(risk.supporting_owners.join(", ")),
                unit_id: unit.clone(),
                severity: assessment.severity,
                likelihood: assessment.likelihood,
                impact: assessment.impact,
                rating: assessment.rating,
                targets: vec![TargetAchievement {
                    target: "Reduce exposure by year end".to_string(),
                    achievement: format!("{} review completed", quarter),
                    status: if q < 3 { TargetStatus::PartiallyImplemented } else { TargetStatus::FullyImplemented },
                }],
                submitted_by: None,
                created_at: Utc::now(),
            };
            storage.insert_submission(&submission)?;
        }
    }
    Ok(registered)
}

#[tokio::main]
async fn main() -> SeedResult<()> {
    let config = Config::from_env()?;
    let _log_guard = logging::init(&config);
    let storage = Storage::open(&config.data_dir)?;

    let accounts = [
        user("admin@udsm.ac.tz", "System", "Administrator", Role::Admin, None)?,
        user("coordinator@udsm.ac.tz", "Amina", "Mushi", Role::Coordinator, Some("DPDI"))?,
        user("champion.coet@udsm.ac.tz", "Juma", "Mwakyusa", Role::Champion, Some("CoET"))?,
        user("champion.dof@udsm.ac.tz", "Rehema", "Nyerere", Role::Champion, Some("DoF"))?,
    ];
    let mut coordinator_id = None;
    for account in &accounts {
        match storage.create_user(account) {
            Ok(()) => info!(email = %account.email, role = %account.role, "seeded user"),
            Err(StorageError::DuplicateEmail(email)) => info!(%email, "user already present"),
            Err(e) => return Err(e.into()),
        }
        if account.role == Role::Coordinator {
            coordinator_id = storage.get_user_by_email(&account.email)?.map(|u| u.id);
        }
    }

    let registered = seed_register(&storage, coordinator_id)?;
    storage.flush().await?;

    let engine = QueryEngine::new(&storage).await?;
    for row in engine.severity_distribution().await? {
        println!("{:<10} {}", row.severity, row.count);
    }
    println!(
        "Seeded {} risks and {} submissions. Demo password for all accounts: {}",
        registered.len(),
        registered.len() * 4,
        DEMO_PASSWORD
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeding_twice_does_not_duplicate_register() {
        let storage = Storage::open_temporary().unwrap();
        let first = seed_register(&storage, None).unwrap();
        assert_eq!(first.len(), RISKS.len());
        assert_eq!(first[0].risk_id, "A1");

        let second = seed_register(&storage, None).unwrap();
        assert!(second.is_empty());
        assert_eq!(storage.list_risks().unwrap().len(), RISKS.len());
        assert_eq!(storage.list_submissions().unwrap().len(), RISKS.len() * 4);
    }
}
