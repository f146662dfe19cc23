use std::sync::Arc;

use receval::config::Config;
use receval::context::AppContext;
use receval::error::{ClientError, DomainError};
use receval::remote::OfflineRemote;
use receval::router::{NavigationOutcome, Prompt, Route, ViewRouter};
use receval::session::{create_token, NoSessionReason, Participation, RestoreOutcome};
use receval::storage::{KeyValueStore, MemoryStore, SqliteStore, IDENTITY_KEY, SETTINGS_CURRENT_KEY, TOKEN_KEY};
use receval::views::{NullLayer, StandardViews};

fn context(storage: Arc<dyn KeyValueStore>, remote: Arc<OfflineRemote>) -> AppContext {
    AppContext::new(Config::default(), storage, remote)
}

#[tokio::test]
async fn test_sign_in_survives_restart() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let remote = Arc::new(OfflineRemote::seeded());

    let mut first = context(storage.clone(), remote.clone());
    let signed_in = first.sign_in("Listener", "listener").await.unwrap();
    assert_eq!(signed_in.identity.name, "listener");
    assert!(signed_in.invite_pending);

    let mut second = context(storage, remote);
    assert_eq!(second.init(), RestoreOutcome::Restored(signed_in.identity.clone()));
    assert_eq!(second.session.identity(), Some(&signed_in.identity));
    assert_eq!(second.session.token(), Some(create_token("listener", "listener").as_str()));
}

#[tokio::test]
async fn test_restore_from_reopened_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.sqlite");
    let path = path.to_str().unwrap();
    let remote = Arc::new(OfflineRemote::seeded());

    {
        let mut ctx = context(Arc::new(SqliteStore::new(path).unwrap()), remote.clone());
        ctx.sign_in("admin", "admin").await.unwrap();
    }

    let mut ctx = context(Arc::new(SqliteStore::new(path).unwrap()), remote);
    let RestoreOutcome::Restored(identity) = ctx.init() else {
        panic!("session should have been restored");
    };
    assert!(identity.is_admin());
    assert_eq!(identity.participation, Participation::None);
}

#[tokio::test]
async fn test_corrupt_record_starts_signed_out() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    storage.set(TOKEN_KEY, &create_token("admin", "admin")).unwrap();
    storage.set(IDENTITY_KEY, "v1.eyJuYW1lIjoiYWRtaW4ifQ.0000000000000000").unwrap();

    let mut ctx = context(storage, Arc::new(OfflineRemote::seeded()));
    assert!(matches!(ctx.init(), RestoreOutcome::NoSession(NoSessionReason::Corrupt(_))));
    assert!(ctx.session.session().is_empty());

    let mut router = ViewRouter::new(StandardViews, Arc::new(NullLayer));
    assert_eq!(
        router.navigate(&ctx, "profile").await,
        NavigationOutcome::Redirected { to: Route::Home, prompt: Prompt::Login }
    );
}

#[tokio::test]
async fn test_missing_record_is_absent() {
    let mut ctx = context(Arc::new(MemoryStore::new()), Arc::new(OfflineRemote::seeded()));
    assert_eq!(ctx.init(), RestoreOutcome::NoSession(NoSessionReason::Absent));
}

#[tokio::test]
async fn test_reset_wipes_storage() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let remote = Arc::new(OfflineRemote::seeded());
    let mut ctx = context(storage.clone(), remote.clone());
    ctx.sign_in("listener", "listener").await.unwrap();
    ctx.settings.get(ctx.remote(), "listener", false).await.unwrap();
    assert!(storage.get(SETTINGS_CURRENT_KEY).unwrap().is_some());

    ctx.reset().unwrap();

    assert!(ctx.user_name().is_none());
    assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(storage.get(IDENTITY_KEY).unwrap(), None);
    assert_eq!(storage.get(SETTINGS_CURRENT_KEY).unwrap(), None);
    assert_eq!(ctx.flush_settings().await, Err(ClientError::NoSession));
}

#[tokio::test]
async fn test_bad_credentials_leave_session_empty() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut ctx = context(storage.clone(), Arc::new(OfflineRemote::seeded()));

    let err = ctx.sign_in("admin", "nope").await.unwrap_err();
    assert_eq!(err, ClientError::Remote(DomainError::BadCredentials.into()));
    assert_eq!(err.user_message(), "Wrong username and/or password.");
    assert!(ctx.session.session().is_empty());
    assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_switching_user_drops_cached_settings() {
    let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let mut ctx = context(storage.clone(), Arc::new(OfflineRemote::seeded()));
    ctx.sign_in("listener", "listener").await.unwrap();
    ctx.settings.get(ctx.remote(), "listener", false).await.unwrap();

    ctx.sign_in("listener", "listener").await.unwrap();
    assert!(storage.get(SETTINGS_CURRENT_KEY).unwrap().is_some());

    let admin = ctx.sign_in("admin", "admin").await.unwrap();
    assert!(!admin.invite_pending);
    assert_eq!(storage.get(SETTINGS_CURRENT_KEY).unwrap(), None);
}
