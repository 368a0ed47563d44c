use std::time::Duration;

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, PublicUser,
            ResetPasswordRequest, SignupRequest, UpdatePasswordRequest,
        },
        extractors::{CurrentUser, SESSION_COOKIE},
        jwt::JwtKeys,
        password,
        repo::User,
        reset::{generate_reset_token, hash_reset_token, RESET_TOKEN_TTL},
    },
    config::AppConfig,
    error::ApiError,
    state::AppState,
};

const BAD_CREDENTIALS: &str = "Incorrect email or password";
const FORGOT_PASSWORD_REPLY: &str = "If that account exists, a reset token has been sent";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updatePassword", patch(update_password))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if password != confirm {
        return Err(ApiError::Validation("Passwords are not the same".into()));
    }
    Ok(())
}

fn session_cookie(config: &AppConfig, token: &str, ttl: Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.is_production())
        .max_age(time::Duration::seconds(ttl.as_secs() as i64))
        .build()
}

/// Mints a session token and attaches it both to the body and the cookie jar.
fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<(CookieJar, AuthResponse), ApiError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id)?;
    let jar = jar.add(session_cookie(&state.config, &token, keys.ttl));
    Ok((
        jar,
        AuthResponse {
            status: "success",
            token,
            user: PublicUser::from(user),
        },
    ))
}

#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let name = payload.name.trim().to_string();

    if name.is_empty() {
        return Err(ApiError::Validation("Please provide your name".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Please provide a valid email".into()));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::EmailTaken);
    }

    let hash = password::hash_password_async(payload.password).await?;
    let user = User::create(&state.db, &name, &payload.email, &hash).await?;

    // Welcome mail is best-effort; signup must not fail on delivery.
    let url = format!("{}/api/v1/users/me", state.config.public_url);
    if let Err(e) = state.mailer.send_welcome(&user, &url).await {
        warn!(error = %e, user_id = %user.id, "welcome email failed");
    }

    info!(user_id = %user.id, email = %user.email, "user signed up");
    let (jar, body) = issue_session(&state, jar, &user)?;
    Ok((StatusCode::CREATED, jar, Json(body)))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let Some(user) = User::find_by_email(&state.db, &payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(ApiError::Unauthenticated(BAD_CREDENTIALS));
    };

    let ok = password::verify_password_async(payload.password, user.password_hash.clone()).await?;

    // Deactivated accounts fail exactly like bad credentials.
    if !ok || !user.active {
        warn!(user_id = %user.id, "login rejected");
        return Err(ApiError::Unauthenticated(BAD_CREDENTIALS));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    let (jar, body) = issue_session(&state, jar, &user)?;
    Ok((jar, Json(body)))
}

#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    // Uniform reply whether or not the account exists.
    let generic = MessageResponse {
        status: "success",
        message: FORGOT_PASSWORD_REPLY,
    };

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(user) if user.active => user,
        _ => {
            debug!(email = %payload.email, "password reset requested for unknown or inactive account");
            return Ok(Json(generic));
        }
    };

    let (plaintext, digest) = generate_reset_token();
    let expires = OffsetDateTime::now_utc() + RESET_TOKEN_TTL;
    User::set_reset_token(&state.db, user.id, &digest, expires).await?;

    let url = format!(
        "{}/api/v1/users/resetPassword/{}",
        state.config.public_url, plaintext
    );
    if let Err(e) = state.mailer.send_password_reset(&user, &url).await {
        // Roll back so no unreachable pending token is left behind.
        error!(error = %e, user_id = %user.id, "reset email failed, clearing token");
        if let Err(e) = User::clear_reset_token(&state.db, user.id).await {
            error!(error = %e, user_id = %user.id, "reset token rollback failed");
        }
        return Err(ApiError::Delivery);
    }

    info!(user_id = %user.id, "password reset token issued");
    Ok(Json(generic))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    // Wrong, consumed and expired tokens are indistinguishable here.
    let digest = hash_reset_token(&token);
    let user = User::find_by_reset_token(&state.db, &digest)
        .await?
        .ok_or(ApiError::InvalidOrExpiredToken)?;

    validate_new_password(&payload.password, &payload.password_confirm)?;

    let hash = password::hash_password_async(payload.password).await?;
    let user = User::record_password_change(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password reset completed");
    let (jar, body) = issue_session(&state, jar, &user)?;
    Ok((jar, Json(body)))
}

#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let ok =
        password::verify_password_async(payload.password_current, user.password_hash.clone())
            .await?;
    if !ok {
        warn!(user_id = %user.id, "update password with wrong current password");
        return Err(ApiError::Unauthenticated("Your current password is wrong"));
    }

    validate_new_password(&payload.password, &payload.password_confirm)?;

    let hash = password::hash_password_async(payload.password).await?;
    let user = User::record_password_change(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "password updated");
    let (jar, body) = issue_session(&state, jar, &user)?;
    Ok((jar, Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtConfig, SmtpConfig};

    #[test]
    fn accepts_plausible_emails_only() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn new_password_must_be_long_enough_and_confirmed() {
        assert!(validate_new_password("secret123", "secret123").is_ok());
        assert!(matches!(
            validate_new_password("short", "short"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_new_password("secret123", "secret124"),
            Err(ApiError::Validation(_))
        ));
    }

    fn config_for(environment: &str) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".into(),
            environment: environment.into(),
            public_url: "http://localhost:8080".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 60,
            },
            smtp: SmtpConfig {
                host: "localhost".into(),
                port: 587,
                username: String::new(),
                password: String::new(),
                from: "hello@messagehub.io".into(),
            },
        }
    }

    #[test]
    fn session_cookie_is_http_only_and_scoped() {
        let cookie = session_cookie(&config_for("development"), "tok", Duration::from_secs(3600));
        assert_eq!(cookie.name(), "jwt");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));
        assert_eq!(cookie.secure(), Some(false));
    }

    #[test]
    fn session_cookie_is_secure_in_production() {
        let cookie = session_cookie(&config_for("production"), "tok", Duration::from_secs(3600));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[tokio::test]
    async fn issue_session_sets_cookie_matching_body_token() {
        let state = AppState::fake();
        let user = User::test_fixture("Ada", "ada@example.com");
        let jar = CookieJar::from_headers(&axum::http::HeaderMap::new());

        let (jar, body) = issue_session(&state, jar, &user).expect("issue session");
        let cookie = jar.get(SESSION_COOKIE).expect("session cookie set");
        assert_eq!(cookie.value(), body.token);

        let claims = JwtKeys::from_ref(&state).verify(&body.token).expect("verify");
        assert_eq!(claims.sub, user.id);
    }

    #[test]
    fn auth_response_contains_no_password_material() {
        let user = User::test_fixture("Ada", "ada@example.com");
        let body = AuthResponse {
            status: "success",
            token: "jwt-token".into(),
            user: PublicUser::from(&user),
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }
}
