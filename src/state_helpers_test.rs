use super::*;
use crate::blob::memory::MemoryBlobStore;
use crate::mail::MemoryMailer;
use crate::model::{Role, Team, User};
use crate::store::UserStore;
use crate::store::memory::MemoryStore;

/// App state wired to in-memory backends, with handles kept for inspection.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub mailer: Arc<MemoryMailer>,
}

#[must_use]
pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "LEADFLOW_BACKEND" => Some("memory".into()),
        "UPLOAD_CHUNK_BYTES" => Some("1024".into()),
        _ => None,
    })
    .expect("memory config should parse")
}

#[must_use]
pub fn test_app() -> TestApp {
    test_app_with_mailer(MemoryMailer::new())
}

#[must_use]
pub fn test_app_with_mailer(mailer: MemoryMailer) -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new(config.public_base_url.clone(), config.upload_chunk_bytes));
    let mailer = Arc::new(mailer);
    let state = AppState::new(store.clone(), blobs.clone(), mailer.clone(), config);
    TestApp { state, store, blobs, mailer }
}

#[must_use]
pub fn test_app_state() -> AppState {
    test_app().state
}

/// Insert a user (and their closer mirror when the role has one).
pub async fn seed_user(store: &MemoryStore, name: &str, role: Role, team_id: Option<&str>) -> User {
    let user = User {
        uid: Uuid::new_v4(),
        display_name: name.into(),
        email: format!("{}@example.com", name.to_ascii_lowercase().replace(' ', ".")),
        role,
        team_id: team_id.map(str::to_owned),
        avatar_url: None,
    };
    store.insert_user(&user, None).await.expect("seed user");
    if role.has_mirror_record() {
        store.insert_closer(user.uid, name).await.expect("seed closer");
    }
    user
}

pub async fn seed_team(store: &MemoryStore, id: &str, name: &str, region_id: &str) -> Team {
    let team = Team { id: id.into(), name: name.into(), region_id: region_id.into() };
    store.upsert_team(&team).await.expect("seed team");
    team
}
