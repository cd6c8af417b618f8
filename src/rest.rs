//! REST API for the risk register using Axum.
//!
//! Public routes cover login/registration; everything under the auth layer requires
//! an `Authorization: Bearer <token>` header. Bodies are JSON in the shape the
//! dashboard SPA sends (camelCase, except `unit_id`).

use axum::{
    async_trait,
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::{bearer_token, verify_password, Authenticator};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Risk, RiskCategory, Role, StrategicObjective, Submission, TargetAchievement, TargetStatus, User,
    UserView,
};
use crate::query::{
    QuarterCount, QuarterKey, QueryEngine, SeverityCount, TrendCount, TrendKey, UnitCount, UnitKey,
};
use crate::scoring::{assess, Severity};
use crate::storage::Storage;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
#[derive(Clone)]
pub struct AppState {
    storage: Arc<Storage>,
    auth: Authenticator,
}

/// JSON body extractor that reports malformed bodies as 400 in the API envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// A score or year posted either as a JSON number or as a numeric string.
#[derive(Deserialize, Debug, Clone, ToSchema)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(i64),
    Text(String),
}

impl NumberOrText {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrText::Number(n) => Some(*n),
            NumberOrText::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Generic REST response (JSON)
#[derive(Serialize, ToSchema)]
pub struct RestResponse {
    pub success: bool,
    pub message: String,
}

impl RestResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self { success: true, message: message.into() })
    }
}

// --- DTOs ---

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub role: Role,
    pub user: UserView,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub unit: Option<String>,
    pub phone: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub user: UserView,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: UserView,
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<UserView>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUnitRequest {
    pub unit_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ObjectiveView {
    pub value: StrategicObjective,
    pub label: String,
}

#[derive(Serialize, ToSchema)]
pub struct ObjectiveListResponse {
    pub success: bool,
    pub data: Vec<ObjectiveView>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRiskRequest {
    pub strategic_objective: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub principal_owner: Option<String>,
    pub supporting_owners: Option<Vec<String>>,
    pub category: Option<RiskCategory>,
    pub likelihood: Option<NumberOrText>,
    pub impact: Option<NumberOrText>,
    pub causes: Option<String>,
    pub consequences: Option<String>,
    pub existing_controls: Option<String>,
    pub proposed_mitigation: Option<String>,
    pub targets: Option<Vec<String>>,
}

/// Partial edit of a risk; absent fields are left unchanged.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRiskRequest {
    pub strategic_objective: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub principal_owner: Option<String>,
    pub supporting_owners: Option<Vec<String>>,
    pub category: Option<RiskCategory>,
    pub likelihood: Option<NumberOrText>,
    pub impact: Option<NumberOrText>,
    pub causes: Option<String>,
    pub consequences: Option<String>,
    pub existing_controls: Option<String>,
    pub proposed_mitigation: Option<String>,
    pub targets: Option<Vec<String>>,
}

#[derive(Serialize, ToSchema)]
pub struct RiskResponse {
    pub success: bool,
    pub data: Risk,
}

#[derive(Serialize, ToSchema)]
pub struct RiskListResponse {
    pub success: bool,
    pub data: Vec<Risk>,
}

#[derive(Deserialize, ToSchema)]
pub struct TargetInput {
    pub target: Option<String>,
    pub achievement: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmissionRequest {
    pub risk_id: Option<String>,
    pub time_period: Option<String>,
    pub year: Option<NumberOrText>,
    #[serde(rename = "unit_id")]
    pub unit_id: Option<String>,
    pub principal_owner: Option<String>,
    pub supporting_owner: Option<String>,
    pub likelihood: Option<NumberOrText>,
    pub impact: Option<NumberOrText>,
    pub targets: Option<Vec<TargetInput>>,
}

#[derive(Serialize, ToSchema)]
pub struct SubmissionResponse {
    pub success: bool,
    pub message: String,
    pub data: Submission,
}

#[derive(Serialize, ToSchema)]
pub struct SubmissionListResponse {
    pub success: bool,
    pub data: Vec<Submission>,
}

#[derive(Deserialize, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SubmissionFilter {
    pub risk_id: Option<String>,
    #[serde(rename = "unit_id")]
    pub unit_id: Option<String>,
    pub year: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SeverityDistributionResponse {
    pub success: bool,
    pub data: Vec<SeverityCount>,
}

#[derive(Serialize, ToSchema)]
pub struct RiskTrendsResponse {
    pub success: bool,
    pub data: Vec<TrendCount>,
}

#[derive(Serialize, ToSchema)]
pub struct UnitBreakdownResponse {
    pub success: bool,
    pub data: Vec<UnitCount>,
}

#[derive(Serialize, ToSchema)]
pub struct QuarterlyBreakdownResponse {
    pub success: bool,
    pub data: Vec<QuarterCount>,
}

// --- Router ---

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;
    let token = bearer_token(auth_header)
        .ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;

    let claims = state.auth.validate_jwt(token).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        ApiError::Unauthorized("Invalid token".to_string())
    })?;

    let user = state
        .storage
        .get_user(&claims.sub)?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;
    if !user.is_active {
        return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
    }

    req.extensions_mut().insert(UserView::from(&user));
    Ok(next.run(req).await)
}

/// Create the Axum router for the risk register API.
pub fn create_router(storage: Storage, auth: Authenticator) -> Router {
    let state = Arc::new(AppState {
        storage: Arc::new(storage),
        auth,
    });

    let auth_routes = Router::new()
        .route("/api/auth/profile", get(profile_handler))
        .route("/api/risks", post(register_risk_handler).get(list_risks_handler))
        .route("/api/risks/champion", get(champion_risks_handler))
        .route("/api/risks/:risk_id", get(get_risk_handler).put(update_risk_handler))
        .route("/api/submissions", post(create_submission_handler).get(list_submissions_handler))
        .route("/api/submissions/analytics/severity-distribution", get(severity_distribution_handler))
        .route("/api/submissions/analytics/risk-trends", get(risk_trends_handler))
        .route("/api/submissions/analytics/unit-breakdown", get(unit_breakdown_handler))
        .route("/api/submissions/analytics/quarterly-breakdown", get(quarterly_breakdown_handler))
        .route("/api/risk-champions", get(list_champions_handler).post(create_champion_handler))
        .route("/api/risk-champions/:id", put(update_champion_unit_handler).delete(deactivate_champion_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/strategic-objectives", get(objectives_handler))
        .merge(auth_routes)
        .with_state(state)
}

// --- Helpers ---

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn clean_list(values: Option<Vec<String>>) -> Option<Vec<String>> {
    values.map(|list| list.into_iter().filter_map(|v| clean(Some(v))).collect())
}

/// Take a required text field, recording `<label> is required` when it is absent.
fn required(
    value: Option<String>,
    field: &'static str,
    label: &str,
    missing: &mut Vec<(&'static str, String)>,
) -> String {
    match clean(value) {
        Some(v) => v,
        None => {
            missing.push((field, format!("{} is required", label)));
            String::new()
        }
    }
}

fn score(value: Option<&NumberOrText>, field: &str) -> ApiResult<i64> {
    let value = value.ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))?;
    value
        .as_i64()
        .ok_or_else(|| ApiError::BadRequest(format!("{} must be a number between 1 and 5", field)))
}

fn parse_year(value: &NumberOrText) -> Option<String> {
    let year = value.as_i64()?;
    (1000..=9999).contains(&year).then(|| year.to_string())
}

/// The caller registered the risk, or its principal/supporting owners name the caller
/// or the caller's unit.
fn owns_risk(user: &UserView, risk: &Risk) -> bool {
    risk.created_by.as_deref() == Some(user.id.as_str())
        || risk.is_owned_by(&user.full_name())
        || risk.is_owned_by(user.unit_id.as_deref().unwrap_or_default())
}

fn require_risk_editor(user: &UserView, risk: &Risk) -> ApiResult<()> {
    if user.role.can_manage_champions() || owns_risk(user, risk) {
        Ok(())
    } else {
        warn!(user_id = %user.id, risk_id = %risk.risk_id, "risk edit denied");
        Err(ApiError::Forbidden(format!("You are not an owner of risk {}", risk.risk_id)))
    }
}

fn require_manager(user: &UserView) -> ApiResult<()> {
    if user.role.can_manage_champions() {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = %user.role, "champion management denied");
        Err(ApiError::Forbidden("Only coordinators and admins may manage risk champions".to_string()))
    }
}

// --- Public handlers ---

async fn root_handler() -> &'static str {
    "Backend is running."
}

/// Health check handler
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up", body = RestResponse)))]
async fn health_handler() -> Json<RestResponse> {
    RestResponse::ok("Risk register API healthy")
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing or malformed credentials"),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "auth"
)]
async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = clean(payload.email).ok_or_else(|| ApiError::BadRequest("Email is required".to_string()))?;
    let email = state.auth.validate_email(&email).map_err(ApiError::BadRequest)?;
    let password = payload
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Password is required".to_string()))?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());
    let user = state.storage.get_user_by_email(&email)?.ok_or_else(invalid)?;
    if !verify_password(&password, &user.password_hash)? {
        warn!(%email, "failed login");
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    let token = state.auth.create_jwt(&user)?;
    info!(user_id = %user.id, role = %user.role, "login");
    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token,
        role: user.role,
        user: UserView::from(&user),
    }))
}

/// Validate a registration body and build the user document it describes.
fn new_user_from(state: &AppState, payload: RegisterRequest, role: Role) -> ApiResult<User> {
    let mut missing = vec![];
    let email = required(payload.email, "email", "Email", &mut missing);
    let password = required(payload.password, "password", "Password", &mut missing);
    let first_name = required(payload.first_name, "firstName", "First name", &mut missing);
    let last_name = required(payload.last_name, "lastName", "Last name", &mut missing);
    let unit = required(payload.unit, "unit", "Unit", &mut missing);
    if !missing.is_empty() {
        return Err(ApiError::InvalidFields {
            message: "All fields are required".to_string(),
            errors: missing,
        });
    }

    let email = state.auth.validate_email(&email).map_err(ApiError::BadRequest)?;
    let now = Utc::now();
    Ok(User {
        id: Uuid::new_v4().to_string(),
        first_name,
        last_name,
        email,
        password_hash: state.auth.hash_password(&password)?,
        role,
        unit_id: Some(unit),
        phone: clean(payload.phone),
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Missing fields or invalid email"),
        (status = 403, description = "Coordinator and admin roles cannot self-register"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
async fn register_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let role = payload.role.unwrap_or(Role::Champion);
    if role.can_manage_champions() {
        warn!(%role, "self-registration with a privileged role refused");
        return Err(ApiError::Forbidden(
            "Coordinator and admin accounts cannot be self-registered".to_string(),
        ));
    }
    let user = new_user_from(&state, payload, role)?;
    state.storage.create_user(&user)?;
    let token = state.auth.create_jwt(&user)?;
    info!(user_id = %user.id, role = %user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully".to_string(),
            token: Some(token),
            user: UserView::from(&user),
        }),
    ))
}

/// Tokens are stateless; the client discards its copy.
#[utoipa::path(post, path = "/api/auth/logout", responses((status = 200, description = "Logged out", body = RestResponse)), tag = "auth")]
async fn logout_handler() -> Json<RestResponse> {
    RestResponse::ok("Logged out successfully")
}

#[utoipa::path(
    get,
    path = "/api/strategic-objectives",
    responses((status = 200, description = "Strategic objectives A-G", body = ObjectiveListResponse)),
    tag = "risks"
)]
async fn objectives_handler() -> Json<ObjectiveListResponse> {
    let data = StrategicObjective::ALL
        .iter()
        .map(|o| ObjectiveView {
            value: *o,
            label: format!("{}. {}", o.letter(), o.label()),
        })
        .collect();
    Json(ObjectiveListResponse { success: true, data })
}

// --- Authenticated handlers ---

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "The caller's account", body = ProfileResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
async fn profile_handler(Extension(user): Extension<UserView>) -> Json<ProfileResponse> {
    Json(ProfileResponse { success: true, user })
}

#[utoipa::path(
    post,
    path = "/api/risks",
    request_body = RegisterRiskRequest,
    responses(
        (status = 201, description = "Risk registered", body = RiskResponse),
        (status = 400, description = "Invalid strategic objective, title or scores"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "risks"
)]
async fn register_risk_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    ApiJson(payload): ApiJson<RegisterRiskRequest>,
) -> ApiResult<(StatusCode, Json<RiskResponse>)> {
    let objective = payload
        .strategic_objective
        .as_deref()
        .and_then(StrategicObjective::parse)
        .ok_or_else(|| {
            ApiError::BadRequest("Invalid or missing strategic objective. Must be a letter A-G.".to_string())
        })?;
    let title = clean(payload.title).ok_or_else(|| ApiError::BadRequest("Title is required".to_string()))?;
    let assessment = assess(
        score(payload.likelihood.as_ref(), "likelihood")?,
        score(payload.impact.as_ref(), "impact")?,
    )?;

    let description = clean(payload.description);
    let principal_owner = clean(payload.principal_owner);
    let supporting_owners = clean_list(payload.supporting_owners).unwrap_or_default();
    let causes = clean(payload.causes);
    let consequences = clean(payload.consequences);
    let existing_controls = clean(payload.existing_controls);
    let proposed_mitigation = clean(payload.proposed_mitigation);
    let targets = clean_list(payload.targets).unwrap_or_default();
    let now = Utc::now();

    let risk = state.storage.register_risk(objective, |risk_id| Risk {
        risk_id,
        title: title.clone(),
        strategic_objective: objective,
        description: description.clone(),
        principal_owner: principal_owner.clone(),
        supporting_owners: supporting_owners.clone(),
        category: payload.category,
        likelihood: assessment.likelihood,
        impact: assessment.impact,
        rating: assessment.rating,
        severity: assessment.severity,
        causes: causes.clone(),
        consequences: consequences.clone(),
        existing_controls: existing_controls.clone(),
        proposed_mitigation: proposed_mitigation.clone(),
        targets: targets.clone(),
        created_by: Some(user.id.clone()),
        created_at: now,
        updated_at: now,
    })?;

    info!(risk_id = %risk.risk_id, rating = risk.rating, severity = %risk.severity, "risk registered");
    Ok((StatusCode::CREATED, Json(RiskResponse { success: true, data: risk })))
}

#[utoipa::path(
    get,
    path = "/api/risks",
    responses((status = 200, description = "All risks, newest first", body = RiskListResponse)),
    security(("bearer" = [])),
    tag = "risks"
)]
async fn list_risks_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<RiskListResponse>> {
    let data = state.storage.list_risks()?;
    Ok(Json(RiskListResponse { success: true, data }))
}

/// Risks the caller owns.
#[utoipa::path(
    get,
    path = "/api/risks/champion",
    responses((status = 200, description = "Risks owned by the caller or the caller's unit", body = RiskListResponse)),
    security(("bearer" = [])),
    tag = "risks"
)]
async fn champion_risks_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
) -> ApiResult<Json<RiskListResponse>> {
    let data = state
        .storage
        .list_risks()?
        .into_iter()
        .filter(|r| owns_risk(&user, r))
        .collect();
    Ok(Json(RiskListResponse { success: true, data }))
}

#[utoipa::path(
    get,
    path = "/api/risks/{riskId}",
    params(("riskId" = String, Path, description = "Risk identifier, e.g. A3")),
    responses(
        (status = 200, description = "The risk", body = RiskResponse),
        (status = 404, description = "No such risk")
    ),
    security(("bearer" = [])),
    tag = "risks"
)]
async fn get_risk_handler(
    State(state): State<Arc<AppState>>,
    Path(risk_id): Path<String>,
) -> ApiResult<Json<RiskResponse>> {
    let risk = state
        .storage
        .get_risk(&risk_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Risk {} not found", risk_id)))?;
    Ok(Json(RiskResponse { success: true, data: risk }))
}

#[utoipa::path(
    put,
    path = "/api/risks/{riskId}",
    params(("riskId" = String, Path, description = "Risk identifier, e.g. A3")),
    request_body = UpdateRiskRequest,
    responses(
        (status = 200, description = "Updated risk with recomputed rating", body = RiskResponse),
        (status = 400, description = "Invalid scores or objective change"),
        (status = 403, description = "Caller neither owns the risk nor manages the register"),
        (status = 404, description = "No such risk")
    ),
    security(("bearer" = [])),
    tag = "risks"
)]
async fn update_risk_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(risk_id): Path<String>,
    ApiJson(payload): ApiJson<UpdateRiskRequest>,
) -> ApiResult<Json<RiskResponse>> {
    let mut risk = state
        .storage
        .get_risk(&risk_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Risk {} not found", risk_id)))?;
    require_risk_editor(&user, &risk)?;

    if let Some(requested) = payload.strategic_objective.as_deref() {
        if StrategicObjective::parse(requested) != Some(risk.strategic_objective) {
            return Err(ApiError::BadRequest(
                "Strategic objective cannot be changed once a risk is registered".to_string(),
            ));
        }
    }
    if let Some(title) = payload.title {
        risk.title = clean(Some(title)).ok_or_else(|| ApiError::BadRequest("Title cannot be empty".to_string()))?;
    }

    let likelihood = match payload.likelihood.as_ref() {
        Some(v) => score(Some(v), "likelihood")?,
        None => risk.likelihood as i64,
    };
    let impact = match payload.impact.as_ref() {
        Some(v) => score(Some(v), "impact")?,
        None => risk.impact as i64,
    };
    let assessment = assess(likelihood, impact)?;
    risk.likelihood = assessment.likelihood;
    risk.impact = assessment.impact;
    risk.rating = assessment.rating;
    risk.severity = assessment.severity;

    if payload.description.is_some() {
        risk.description = clean(payload.description);
    }
    if payload.principal_owner.is_some() {
        risk.principal_owner = clean(payload.principal_owner);
    }
    if let Some(owners) = clean_list(payload.supporting_owners) {
        risk.supporting_owners = owners;
    }
    if payload.category.is_some() {
        risk.category = payload.category;
    }
    if payload.causes.is_some() {
        risk.causes = clean(payload.causes);
    }
    if payload.consequences.is_some() {
        risk.consequences = clean(payload.consequences);
    }
    if payload.existing_controls.is_some() {
        risk.existing_controls = clean(payload.existing_controls);
    }
    if payload.proposed_mitigation.is_some() {
        risk.proposed_mitigation = clean(payload.proposed_mitigation);
    }
    if let Some(targets) = clean_list(payload.targets) {
        risk.targets = targets;
    }
    risk.updated_at = Utc::now();

    state.storage.update_risk(&risk)?;
    info!(risk_id = %risk.risk_id, "risk updated");
    Ok(Json(RiskResponse { success: true, data: risk }))
}

#[utoipa::path(
    post,
    path = "/api/submissions",
    request_body = CreateSubmissionRequest,
    responses(
        (status = 201, description = "Submission stored", body = SubmissionResponse),
        (status = 400, description = "Missing required field or invalid scores"),
        (status = 404, description = "Referenced risk does not exist")
    ),
    security(("bearer" = [])),
    tag = "submissions"
)]
async fn create_submission_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    ApiJson(payload): ApiJson<CreateSubmissionRequest>,
) -> ApiResult<(StatusCode, Json<SubmissionResponse>)> {
    let mut missing = vec![];
    let risk_id = required(payload.risk_id, "riskId", "Risk id", &mut missing);
    let time_period = required(payload.time_period, "timePeriod", "Time period", &mut missing);
    let unit_id = required(payload.unit_id, "unit_id", "Unit", &mut missing);
    if payload.year.is_none() {
        missing.push(("year", "Year is required".to_string()));
    }
    if payload.likelihood.is_none() {
        missing.push(("likelihood", "Likelihood is required".to_string()));
    }
    if payload.impact.is_none() {
        missing.push(("impact", "Impact is required".to_string()));
    }
    if !missing.is_empty() {
        return Err(ApiError::InvalidFields {
            message: "Missing required fields".to_string(),
            errors: missing,
        });
    }

    let year = payload
        .year
        .as_ref()
        .and_then(parse_year)
        .ok_or_else(|| ApiError::BadRequest("Year must be a four-digit number".to_string()))?;
    let assessment = assess(
        score(payload.likelihood.as_ref(), "likelihood")?,
        score(payload.impact.as_ref(), "impact")?,
    )?;

    let mut targets = vec![];
    for (i, row) in payload.targets.unwrap_or_default().into_iter().enumerate() {
        let incomplete = || ApiError::BadRequest(format!("Please fill all fields for target {}", i + 1));
        let target = clean(row.target).ok_or_else(incomplete)?;
        let achievement = clean(row.achievement).ok_or_else(incomplete)?;
        let status = row
            .status
            .as_deref()
            .and_then(TargetStatus::parse)
            .ok_or_else(incomplete)?;
        targets.push(TargetAchievement { target, achievement, status });
    }

    let risk = state
        .storage
        .get_risk(&risk_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Risk {} not found", risk_id)))?;

    let supporting_owner = clean(payload.supporting_owner).or_else(|| {
        (!risk.supporting_owners.is_empty()).then(|| risk.supporting_owners.join(", "))
    });
    let submission = Submission {
        id: Uuid::new_v4().to_string(),
        risk_id: risk.risk_id,
        risk_title: risk.title,
        strategic_objective: risk.strategic_objective,
        time_period,
        year,
        principal_owner: clean(payload.principal_owner).or(risk.principal_owner),
        supporting_owner,
        unit_id,
        severity: assessment.severity,
        likelihood: assessment.likelihood,
        impact: assessment.impact,
        rating: assessment.rating,
        targets,
        submitted_by: Some(user.id.clone()),
        created_at: Utc::now(),
    };
    state.storage.insert_submission(&submission)?;

    info!(
        submission_id = %submission.id,
        risk_id = %submission.risk_id,
        severity = %submission.severity,
        "submission created"
    );
    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            success: true,
            message: "Submission created successfully".to_string(),
            data: submission,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/submissions",
    params(SubmissionFilter),
    responses((status = 200, description = "Submissions, newest first", body = SubmissionListResponse)),
    security(("bearer" = [])),
    tag = "submissions"
)]
async fn list_submissions_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SubmissionFilter>,
) -> ApiResult<Json<SubmissionListResponse>> {
    let data = state
        .storage
        .list_submissions()?
        .into_iter()
        .filter(|s| {
            filter.risk_id.as_deref().map_or(true, |id| s.risk_id == id)
                && filter.unit_id.as_deref().map_or(true, |u| s.unit_id.eq_ignore_ascii_case(u))
                && filter.year.as_deref().map_or(true, |y| s.year == y)
        })
        .collect();
    Ok(Json(SubmissionListResponse { success: true, data }))
}

// --- Analytics (committee dashboard) ---

async fn analytics_engine(state: &AppState) -> ApiResult<QueryEngine> {
    QueryEngine::new(&state.storage).await.map_err(ApiError::internal)
}

#[utoipa::path(
    get,
    path = "/api/submissions/analytics/severity-distribution",
    responses((status = 200, description = "Submission counts per severity", body = SeverityDistributionResponse)),
    security(("bearer" = [])),
    tag = "analytics"
)]
async fn severity_distribution_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SeverityDistributionResponse>> {
    let data = analytics_engine(&state)
        .await?
        .severity_distribution()
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(SeverityDistributionResponse { success: true, data }))
}

#[utoipa::path(
    get,
    path = "/api/submissions/analytics/risk-trends",
    responses((status = 200, description = "Counts per month and severity", body = RiskTrendsResponse)),
    security(("bearer" = [])),
    tag = "analytics"
)]
async fn risk_trends_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<RiskTrendsResponse>> {
    let data = analytics_engine(&state).await?.risk_trends().await.map_err(ApiError::internal)?;
    Ok(Json(RiskTrendsResponse { success: true, data }))
}

#[utoipa::path(
    get,
    path = "/api/submissions/analytics/unit-breakdown",
    responses((status = 200, description = "Counts per unit and severity", body = UnitBreakdownResponse)),
    security(("bearer" = [])),
    tag = "analytics"
)]
async fn unit_breakdown_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<UnitBreakdownResponse>> {
    let data = analytics_engine(&state).await?.unit_breakdown().await.map_err(ApiError::internal)?;
    Ok(Json(UnitBreakdownResponse { success: true, data }))
}

#[utoipa::path(
    get,
    path = "/api/submissions/analytics/quarterly-breakdown",
    responses((status = 200, description = "Counts per year, quarter and severity", body = QuarterlyBreakdownResponse)),
    security(("bearer" = [])),
    tag = "analytics"
)]
async fn quarterly_breakdown_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<QuarterlyBreakdownResponse>> {
    let data = analytics_engine(&state)
        .await?
        .quarterly_breakdown()
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(QuarterlyBreakdownResponse { success: true, data }))
}

// --- Risk champion management (coordinators/admins) ---

#[utoipa::path(
    get,
    path = "/api/risk-champions",
    responses(
        (status = 200, description = "All risk champion accounts", body = UserListResponse),
        (status = 403, description = "Caller is not a coordinator or admin")
    ),
    security(("bearer" = [])),
    tag = "champions"
)]
async fn list_champions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
) -> ApiResult<Json<UserListResponse>> {
    require_manager(&user)?;
    let users = state
        .storage
        .list_users_by_role(Role::Champion)?
        .iter()
        .map(UserView::from)
        .collect();
    Ok(Json(UserListResponse { success: true, users }))
}

#[utoipa::path(
    post,
    path = "/api/risk-champions",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Champion account created", body = RegisterResponse),
        (status = 403, description = "Caller is not a coordinator or admin"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer" = [])),
    tag = "champions"
)]
async fn create_champion_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    require_manager(&user)?;
    let champion = new_user_from(&state, payload, Role::Champion)?;
    state.storage.create_user(&champion)?;
    info!(user_id = %champion.id, by = %user.id, "risk champion registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "Risk champion registered successfully".to_string(),
            token: None,
            user: UserView::from(&champion),
        }),
    ))
}

fn load_champion(state: &AppState, id: &str) -> ApiResult<User> {
    state
        .storage
        .get_user(id)?
        .filter(|u| u.role == Role::Champion)
        .ok_or_else(|| ApiError::NotFound("Risk champion not found".to_string()))
}

#[utoipa::path(
    put,
    path = "/api/risk-champions/{id}",
    params(("id" = String, Path, description = "Champion user id")),
    request_body = UpdateUnitRequest,
    responses(
        (status = 200, description = "Champion moved to the unit", body = ProfileResponse),
        (status = 403, description = "Caller is not a coordinator or admin"),
        (status = 404, description = "No such champion")
    ),
    security(("bearer" = [])),
    tag = "champions"
)]
async fn update_champion_unit_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateUnitRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    require_manager(&user)?;
    let unit = clean(payload.unit_id).ok_or_else(|| ApiError::BadRequest("unit_id is required".to_string()))?;
    let mut champion = load_champion(&state, &id)?;
    champion.unit_id = Some(unit);
    champion.updated_at = Utc::now();
    state.storage.update_user(&champion)?;
    info!(user_id = %champion.id, unit = ?champion.unit_id, "risk champion unit changed");
    Ok(Json(ProfileResponse { success: true, user: UserView::from(&champion) }))
}

#[utoipa::path(
    delete,
    path = "/api/risk-champions/{id}",
    params(("id" = String, Path, description = "Champion user id")),
    responses(
        (status = 200, description = "Champion deactivated", body = RestResponse),
        (status = 403, description = "Caller is not a coordinator or admin"),
        (status = 404, description = "No such champion")
    ),
    security(("bearer" = [])),
    tag = "champions"
)]
async fn deactivate_champion_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserView>,
    Path(id): Path<String>,
) -> ApiResult<Json<RestResponse>> {
    require_manager(&user)?;
    let mut champion = load_champion(&state, &id)?;
    champion.is_active = false;
    champion.updated_at = Utc::now();
    state.storage.update_user(&champion)?;
    info!(user_id = %champion.id, by = %user.id, "risk champion deactivated");
    Ok(RestResponse::ok("Risk champion deactivated"))
}

/// Registers the `bearer` JWT scheme the secured operations refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        login_handler,
        register_handler,
        logout_handler,
        objectives_handler,
        profile_handler,
        register_risk_handler,
        list_risks_handler,
        champion_risks_handler,
        get_risk_handler,
        update_risk_handler,
        create_submission_handler,
        list_submissions_handler,
        severity_distribution_handler,
        risk_trends_handler,
        unit_breakdown_handler,
        quarterly_breakdown_handler,
        list_champions_handler,
        create_champion_handler,
        update_champion_unit_handler,
        deactivate_champion_handler,
    ),
    modifiers(&SecurityAddon),
    components(schemas(
        RestResponse,
        LoginRequest,
        LoginResponse,
        RegisterRequest,
        RegisterResponse,
        RegisterRiskRequest,
        RiskResponse,
        RiskListResponse,
        CreateSubmissionRequest,
        TargetInput,
        NumberOrText,
        SubmissionResponse,
        SubmissionListResponse,
        UserView,
        Role,
        Risk,
        RiskCategory,
        StrategicObjective,
        Submission,
        TargetAchievement,
        TargetStatus,
        Severity,
        SeverityCount,
        TrendCount,
        TrendKey,
        UnitCount,
        UnitKey,
        QuarterCount,
        QuarterKey,
        SeverityDistributionResponse,
        RiskTrendsResponse,
        UnitBreakdownResponse,
        QuarterlyBreakdownResponse,
        ObjectiveView,
        ObjectiveListResponse,
        UserListResponse,
        ProfileResponse,
        UpdateRiskRequest,
        UpdateUnitRequest,
    )),
    tags(
        (name = "auth", description = "Login and registration"),
        (name = "risks", description = "Risk register"),
        (name = "submissions", description = "Quarterly risk reports"),
        (name = "analytics", description = "Committee dashboard aggregates"),
        (name = "champions", description = "Risk champion management")
    )
)]
struct ApiDoc;
