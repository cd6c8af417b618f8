//! Persisted documents (Sled/JSON) and the enums shared between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::scoring::Severity;

/// Institution-level goal a risk is filed against. The letter prefixes risk ids.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
pub enum StrategicObjective {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl StrategicObjective {
    pub const ALL: [StrategicObjective; 7] = [
        StrategicObjective::A,
        StrategicObjective::B,
        StrategicObjective::C,
        StrategicObjective::D,
        StrategicObjective::E,
        StrategicObjective::F,
        StrategicObjective::G,
    ];

    /// Accepts a single letter a-g in either case.
    pub fn parse(input: &str) -> Option<Self> {
        let mut chars = input.trim().chars();
        let letter = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        match letter.to_ascii_uppercase() {
            'A' => Some(StrategicObjective::A),
            'B' => Some(StrategicObjective::B),
            'C' => Some(StrategicObjective::C),
            'D' => Some(StrategicObjective::D),
            'E' => Some(StrategicObjective::E),
            'F' => Some(StrategicObjective::F),
            'G' => Some(StrategicObjective::G),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            StrategicObjective::A => 'A',
            StrategicObjective::B => 'B',
            StrategicObjective::C => 'C',
            StrategicObjective::D => 'D',
            StrategicObjective::E => 'E',
            StrategicObjective::F => 'F',
            StrategicObjective::G => 'G',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrategicObjective::A => "Incidence and impacts of HIV/AIDS and non-communicable diseases reduced",
            StrategicObjective::B => "The National Anti-Corruption Strategy and Action Plan effectively implemented",
            StrategicObjective::C => "Quality, relevance and responsiveness of undergraduate training, leadership in postgraduate training and industry linkages enhanced",
            StrategicObjective::D => "Research, innovation, and knowledge exchange enhanced",
            StrategicObjective::E => "Governance, Leadership and Management Systems and Processes Strengthened",
            StrategicObjective::F => "Internationalization, marketing and visibility",
            StrategicObjective::G => "Institutional capacity and operational efficiency strengthened",
        }
    }
}

impl fmt::Display for StrategicObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
pub enum RiskCategory {
    Academic,
    Compliance,
    Financial,
    #[serde(rename = "Fraud and Corruption")]
    FraudAndCorruption,
    Governance,
    #[serde(rename = "Health, Safety and Welfare")]
    HealthSafetyAndWelfare,
    #[serde(rename = "Human capital")]
    HumanCapital,
    #[serde(rename = "ICT")]
    Ict,
    #[serde(rename = "Infrastructure Management")]
    InfrastructureManagement,
    Operational,
    #[serde(rename = "Research & consultancy")]
    ResearchAndConsultancy,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Coordinator,
    Committee,
    Champion,
    DeputyViceChancellor,
    ViceChancellor,
}

impl Role {
    /// Coordinators and admins register and manage risk champions.
    pub fn can_manage_champions(&self) -> bool {
        matches!(self, Role::Admin | Role::Coordinator)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Coordinator => "coordinator",
            Role::Committee => "committee",
            Role::Champion => "champion",
            Role::DeputyViceChancellor => "deputy_vice_chancellor",
            Role::ViceChancellor => "vice_chancellor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered risk, keyed in Sled by `risk_id`.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    pub risk_id: String,
    pub title: String,
    pub strategic_objective: StrategicObjective,
    pub description: Option<String>,
    pub principal_owner: Option<String>,
    #[serde(default)]
    pub supporting_owners: Vec<String>,
    pub category: Option<RiskCategory>,
    pub likelihood: u8,
    pub impact: u8,
    pub rating: u8,
    pub severity: Severity,
    pub causes: Option<String>,
    pub consequences: Option<String>,
    pub existing_controls: Option<String>,
    pub proposed_mitigation: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Risk {
    /// True when the principal owner or any supporting owner names `who`.
    pub fn is_owned_by(&self, who: &str) -> bool {
        let who = who.trim();
        if who.is_empty() {
            return false;
        }
        let matches = |owner: &str| owner.trim().eq_ignore_ascii_case(who);
        self.principal_owner.as_deref().map_or(false, matches)
            || self.supporting_owners.iter().any(|o| matches(o.as_str()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    NotImplemented,
    PartiallyImplemented,
    FullyImplemented,
}

impl TargetStatus {
    /// The dashboard posts the numeric codes 1-3; named forms are accepted too.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "1" | "not_implemented" => Some(TargetStatus::NotImplemented),
            "2" | "partially_implemented" => Some(TargetStatus::PartiallyImplemented),
            "3" | "fully_implemented" => Some(TargetStatus::FullyImplemented),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct TargetAchievement {
    pub target: String,
    pub achievement: String,
    pub status: TargetStatus,
}

/// A quarterly report against a risk. Append-only.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub risk_id: String,
    pub risk_title: String,
    pub strategic_objective: StrategicObjective,
    pub time_period: String,
    pub year: String,
    pub principal_owner: Option<String>,
    pub supporting_owner: Option<String>,
    #[serde(rename = "unit_id")]
    pub unit_id: String,
    pub severity: Severity,
    pub likelihood: u8,
    pub impact: u8,
    pub rating: u8,
    pub targets: Vec<TargetAchievement>,
    pub submitted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub unit_id: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Reduced user projection returned by the API and attached to authenticated requests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(rename = "unit_id")]
    pub unit_id: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
}

impl UserView {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            unit_id: user.unit_id.clone(),
            phone: user.phone.clone(),
            is_active: user.is_active,
        }
    }
}

/// JWT claims.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // user id
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategic_objective_parse() {
        assert_eq!(StrategicObjective::parse("a"), Some(StrategicObjective::A));
        assert_eq!(StrategicObjective::parse(" G "), Some(StrategicObjective::G));
        assert_eq!(StrategicObjective::parse("H"), None);
        assert_eq!(StrategicObjective::parse("AB"), None);
        assert_eq!(StrategicObjective::parse(""), None);
    }

    #[test]
    fn test_target_status_codes() {
        assert_eq!(TargetStatus::parse("1"), Some(TargetStatus::NotImplemented));
        assert_eq!(TargetStatus::parse("Partially implemented"), Some(TargetStatus::PartiallyImplemented));
        assert_eq!(TargetStatus::parse("fully_implemented"), Some(TargetStatus::FullyImplemented));
        assert_eq!(TargetStatus::parse("4"), None);
    }

    #[test]
    fn test_category_and_role_wire_names() {
        let cat: RiskCategory = serde_json::from_str("\"Fraud and Corruption\"").unwrap();
        assert_eq!(cat, RiskCategory::FraudAndCorruption);
        assert_eq!(serde_json::to_string(&Role::DeputyViceChancellor).unwrap(), "\"deputy_vice_chancellor\"");
    }

    #[test]
    fn test_risk_ownership_match_is_case_insensitive() {
        let now = Utc::now();
        let risk = Risk {
            risk_id: "A1".to_string(),
            title: "Budget overrun".to_string(),
            strategic_objective: StrategicObjective::A,
            description: None,
            principal_owner: Some("DoF".to_string()),
            supporting_owners: vec!["Jane Doe".to_string()],
            category: Some(RiskCategory::Financial),
            likelihood: 2,
            impact: 3,
            rating: 6,
            severity: Severity::Moderate,
            causes: None,
            consequences: None,
            existing_controls: None,
            proposed_mitigation: None,
            targets: vec![],
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        assert!(risk.is_owned_by("dof"));
        assert!(risk.is_owned_by("jane doe"));
        assert!(!risk.is_owned_by("CoET"));
        assert!(!risk.is_owned_by("  "));
    }
}
