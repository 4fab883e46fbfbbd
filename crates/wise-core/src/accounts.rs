//! Registration and sign-in against the hosted auth service.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use wise_types::ValidationError;
use wise_types::api::{LoginRequest, RegisterRequest};
use wise_types::models::AuthUser;
use wise_types::session::{Session, SessionMode};

use crate::store::{AuthProvider, SignUp, StoreError};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("{0} is not an administrator")]
    Unauthorized(String),
    /// The auth service refused the request (e.g. the email is taken).
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthenticated => Self::InvalidCredentials,
            StoreError::Remote { status, message } if (400..500).contains(&status) => {
                Self::Rejected(message)
            }
            other => Self::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    auth: Arc<dyn AuthProvider>,
    admin_emails: Vec<String>,
}

impl AccountService {
    pub fn new(auth: Arc<dyn AuthProvider>, admin_emails: Vec<String>) -> Self {
        let admin_emails = admin_emails
            .into_iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { auth, admin_emails }
    }

    /// Create an account. The profile row is written by the backend from
    /// the metadata sent here.
    pub async fn register(
        &self,
        request: &RegisterRequest,
        current_year: i32,
    ) -> Result<AuthUser, AccountError> {
        request.validate(current_year)?;

        let user = self
            .auth
            .sign_up(&SignUp {
                email: request.email.trim().to_string(),
                password: request.password.clone(),
                username: request.username.trim().to_string(),
                user_type: request.user_type,
                birth_year: request.birth_year,
            })
            .await?;

        info!("Registered {:?} account {}", request.user_type, user.id);
        Ok(user)
    }

    pub async fn sign_in(&self, request: &LoginRequest) -> Result<Session, AccountError> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(AccountError::InvalidCredentials);
        }

        let signed_in = match self.auth.sign_in(request.email.trim(), &request.password).await {
            Ok(s) => s,
            Err(StoreError::Remote { status: 400 | 401, .. }) => {
                return Err(AccountError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };
        let user = signed_in.user;
        let session = Session::member(user.id, user.email.clone(), signed_in.access_token);

        if !request.admin {
            info!("User {} signed in", user.id);
            return Ok(session);
        }

        if !self.is_admin_email(&user.email) {
            warn!("Admin sign-in refused for {}", user.email);
            self.sign_out(&session).await;
            return Err(AccountError::Unauthorized(user.email));
        }

        info!("Admin {} signed in", user.id);
        Ok(Session {
            mode: SessionMode::Admin,
            ..session
        })
    }

    /// Browse-only session. Nothing is sent to the backend.
    pub fn guest(&self) -> Session {
        Session::guest()
    }

    /// Revoke the backend session. Failures are logged and ignored.
    pub async fn sign_out(&self, session: &Session) {
        if session.access_token().is_none() {
            return;
        }
        if let Err(e) = self.auth.sign_out(session).await {
            warn!("Sign-out failed: {}", e);
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use wise_types::models::UserType;

    use super::*;
    use crate::test_support::MemoryBackend;

    fn service() -> (AccountService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let service = AccountService::new(backend.clone(), vec![" Admin@Example.com ".into()]);
        (service, backend)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            username: "mei".into(),
            password: "secret123".into(),
            confirm_password: "secret123".into(),
            user_type: UserType::Expert,
            birth_year: Some(1990),
            agree_to_terms: true,
        }
    }

    fn login(email: &str, password: &str, admin: bool) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
            admin,
        }
    }

    #[tokio::test]
    async fn register_then_sign_in() {
        let (service, _backend) = service();

        let user = service
            .register(&register_request("mei@example.com"), 2025)
            .await
            .unwrap();
        assert_eq!(user.user_type, Some(UserType::Expert));

        let session = service
            .sign_in(&login("mei@example.com", "secret123", false))
            .await
            .unwrap();
        assert_eq!(session.mode, SessionMode::Member);
        assert_eq!(session.user_id, Some(user.id));
        assert!(session.access_token().is_some());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (service, _backend) = service();
        service
            .register(&register_request("mei@example.com"), 2025)
            .await
            .unwrap();

        let err = service
            .register(&register_request("mei@example.com"), 2025)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Rejected(_)));
    }

    #[tokio::test]
    async fn invalid_registration_never_reaches_backend() {
        let (service, backend) = service();
        backend.faults.auth.store(true, Ordering::SeqCst);

        let mut request = register_request("kid@example.com");
        request.birth_year = Some(2020);
        let err = service.register(&request, 2025).await.unwrap_err();
        assert!(matches!(err, AccountError::Validation(ValidationError::TooYoung { .. })));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let (service, backend) = service();
        backend.sign_in_as("amy@example.com");

        let err = service
            .sign_in(&login("amy@example.com", "nope", false))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));
    }

    #[tokio::test]
    async fn admin_sign_in_checks_allow_list() {
        let (service, backend) = service();
        backend.sign_in_as("admin@example.com");
        backend.sign_in_as("amy@example.com");

        let admin = service
            .sign_in(&login("admin@example.com", "password", true))
            .await
            .unwrap();
        assert!(admin.is_admin());

        let err = service
            .sign_in(&login("amy@example.com", "password", true))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Unauthorized(email) if email == "amy@example.com"));
    }

    #[tokio::test]
    async fn guest_and_sign_out_are_best_effort() {
        let (service, backend) = service();
        let guest = service.guest();
        assert!(guest.is_guest());
        service.sign_out(&guest).await;

        let session = backend.sign_in_as("amy@example.com");
        service.sign_out(&session).await;
        assert!(backend.current_user(&session).await.unwrap().is_none());
    }
}
