use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use warden::prelude::*;
use warden::types::LoginLocation;
use warden_store::MemoryGateway;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Algorithm id for [`digest`]: one salted SHA-256 round. Demo only, a real
/// server wants a slow password hash.
const DEMO_ALGORITHM: u32 = 1;

fn digest(salt: u64, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.to_be_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn new_credential(password: &str) -> Credential {
    let salt: u64 = rand::random();
    Credential::new(format!("{salt:016x}${}", digest(salt, password)), DEMO_ALGORITHM)
}

fn verify(credential: &Credential, password: &str) -> bool {
    if credential.algorithm != DEMO_ALGORITHM {
        return false;
    }
    let Some((salt, hash)) = credential.secret.split_once('$') else {
        return false;
    };
    u64::from_str_radix(salt, 16).is_ok_and(|salt| digest(salt, password) == hash)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

struct Register {
    password: String,
}

impl AuthAction for Register {
    fn name(&self) -> &str {
        "register"
    }

    fn run(&self, ctx: &ActionContext<'_>) -> ActionResult {
        if ctx.session().is_registered() {
            return Err("You are already registered.".into());
        }
        if self.password.len() < 6 {
            return Err("Password must be at least 6 characters.".into());
        }

        let mut profile = ctx.profile().clone();
        profile.set_credential(Some(new_credential(&self.password)));
        profile.set_registered_at(now());
        profile.set_last_login(now());
        ctx.gateway()
            .insert_profile(&profile)
            .map_err(|e| format!("Registration failed: {e}"))?;
        let written = profile.record().revision();
        profile.record_mut().mark_persisted(written);

        Ok(Transition::to(AuthMode::Authenticated)
            .with_message("Registered and logged in.")
            .with_profile(profile))
    }
}

struct Login {
    password: String,
}

impl AuthAction for Login {
    fn name(&self) -> &str {
        "login"
    }

    fn run(&self, ctx: &ActionContext<'_>) -> ActionResult {
        if ctx.session().is_logged_in() {
            return Err("You are already logged in.".into());
        }
        let Some(credential) = ctx.profile().credential() else {
            return Err("You are not registered yet.".into());
        };
        if !verify(credential, &self.password) {
            return Err("Invalid password.".into());
        }

        let mut profile = ctx.profile().clone();
        profile.set_last_login(now());
        Ok(Transition::to(AuthMode::Authenticated)
            .with_message("Logged in.")
            .with_profile(profile))
    }
}

struct Logout;

impl AuthAction for Logout {
    fn name(&self) -> &str {
        "logout"
    }

    fn run(&self, ctx: &ActionContext<'_>) -> ActionResult {
        if !ctx.session().is_logged_in() {
            return Err("You are not logged in.".into());
        }
        Ok(Transition::to(AuthMode::Unauthenticated).with_message("Logged out."))
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Writes every mode change to the log.
struct AuditLog;

impl AuthListener for AuditLog {
    fn on_mode_changed(&self, event: &ModeChangedEvent<'_>) {
        tracing::info!(
            user_id = %event.user_id(),
            from = %event.previous(),
            to = %event.current(),
            "audit: mode changed"
        );
    }
}

/// Refuses every action while closed.
#[derive(Default)]
struct Gate {
    closed: AtomicBool,
}

impl Gate {
    fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }
}

impl AuthListener for Gate {
    fn on_pre_action(&self, _event: &PreActionEvent<'_>) -> Verdict {
        if self.closed.load(Ordering::SeqCst) {
            Verdict::cancel("Logins are paused, try again later.")
        } else {
            Verdict::Proceed
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

async fn act(
    warden: &Warden,
    user_id: UserId,
    action: Arc<dyn AuthAction>,
) -> Result<(), WardenError> {
    let name = action.name().to_string();
    let response = warden.sessions().perform_action(user_id, action).await?;
    let mode = warden.sessions().auth_mode(user_id).await?;
    eprintln!(
        "  {name:<9} ok={:<5} mode={mode} {}",
        response.is_success(),
        response.message().unwrap_or("")
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => WardenConfig::load(path)?,
        None => WardenConfig::default(),
    };
    init_logging(&config.log_filter);

    let store = MemoryGateway::new();
    let gate = Arc::new(Gate::default());
    let warden = Warden::builder()
        .config(config)
        .listener(Arc::new(AuditLog))
        .listener(gate.clone())
        .start(Arc::new(store.clone()));

    let id = UserId::random();
    let password = "correct horse".to_string();

    eprintln!("first visit:");
    let mode = warden.join(id, "Alex").await?;
    eprintln!("  joined as {mode}");
    act(&warden, id, Arc::new(Register { password: password.clone() })).await?;
    warden
        .sessions()
        .with_session(id, |s| {
            s.profile_mut()
                .set_location(LoginLocation::new("world", 120.5, 64.0, -33.0));
        })
        .await?;
    warden.leave(id).await?;

    eprintln!("second visit:");
    let mode = warden.join(id, "Alex").await?;
    eprintln!("  joined as {mode}");
    act(&warden, id, Arc::new(Login { password: "wrong".into() })).await?;
    act(&warden, id, Arc::new(Login { password })).await?;
    gate.set_closed(true);
    act(&warden, id, Arc::new(Logout)).await?;
    gate.set_closed(false);
    act(&warden, id, Arc::new(Logout)).await?;
    warden.leave(id).await?;

    eprintln!("storage saw {} calls", store.calls().len());
    warden.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use warden::session::{PlayerSession, SessionServices, SubscriberBus};
    use warden_store::CallKind;

    use super::*;

    fn session(store: &MemoryGateway, profile: PlayerProfile, mode: AuthMode) -> PlayerSession {
        let services = SessionServices::new(Arc::new(store.clone()));
        PlayerSession::new(profile, mode, services)
    }

    fn uid() -> UserId {
        UserId::from_u128(1)
    }

    #[test]
    fn test_verify_accepts_only_the_registered_password() {
        let credential = new_credential("hunter22");
        assert!(verify(&credential, "hunter22"));
        assert!(!verify(&credential, "hunter23"));
        assert!(!verify(&Credential::new("garbage", DEMO_ALGORITHM), "hunter22"));
    }

    #[test]
    fn test_digest_is_stable_sha256() {
        // sha256 of 8 zero bytes followed by "abc".
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update([0u8; 8]);
            hasher.update(b"abc");
            hasher.finalize()
        };
        let hex = digest(0, "abc");
        assert_eq!(hex.len(), 64);
        assert_eq!(
            hex,
            expected.iter().map(|b| format!("{b:02x}")).collect::<String>()
        );
    }

    #[test]
    fn test_register_inserts_profile_and_authenticates() {
        let store = MemoryGateway::new();
        let mut s = session(&store, PlayerProfile::blank(uid(), "Alex"), AuthMode::Unregistered);

        let response = s.perform_action(&Register {
            password: "hunter22".into(),
        });

        assert!(response.is_success());
        assert!(s.is_logged_in());
        assert_eq!(store.count(CallKind::InsertProfile), 1);
        assert!(!s.profile().is_dirty());
    }

    #[test]
    fn test_register_short_password_is_rejected() {
        let store = MemoryGateway::new();
        let mut s = session(&store, PlayerProfile::blank(uid(), "Alex"), AuthMode::Unregistered);

        let response = s.perform_action(&Register {
            password: "abc".into(),
        });

        assert!(!response.is_success());
        assert_eq!(s.auth_mode(), AuthMode::Unregistered);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_login_then_logout_round_trip() {
        let store = MemoryGateway::new();
        let mut profile = PlayerProfile::blank(uid(), "Alex");
        profile.set_credential(Some(new_credential("hunter22")));
        let mut s = session(&store, profile, AuthMode::Unauthenticated);

        assert!(!s.perform_action(&Login { password: "nope".into() }).is_success());
        assert!(s.perform_action(&Login { password: "hunter22".into() }).is_success());
        assert!(s.profile().last_login().is_some());
        assert!(s.perform_action(&Logout).is_success());
        assert_eq!(s.auth_mode(), AuthMode::Unauthenticated);
    }

    #[test]
    fn test_gate_cancels_while_closed() {
        let gate = Arc::new(Gate::default());
        gate.set_closed(true);
        let services = SessionServices::new(Arc::new(MemoryGateway::new()))
            .with_events(Arc::new(SubscriberBus::new().with_listener(gate.clone())));
        let mut s = PlayerSession::new(
            PlayerProfile::blank(uid(), "Alex"),
            AuthMode::Unregistered,
            services,
        );

        let response = s.perform_action(&Register {
            password: "hunter22".into(),
        });

        assert_eq!(response.message(), Some("Logins are paused, try again later."));
        assert_eq!(s.auth_mode(), AuthMode::Unregistered);
    }
}
