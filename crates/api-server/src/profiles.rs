//! Registry of user ad profiles synced from the main profile service.
//! The ads subsystem treats these as read-only demographic inputs.

use dashmap::DashMap;
use dega_core::types::UserAdProfile;
use uuid::Uuid;

pub struct ProfileRegistry {
    profiles: DashMap<Uuid, UserAdProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn get(&self, user_id: Uuid) -> Option<UserAdProfile> {
        self.profiles.get(&user_id).map(|r| r.value().clone())
    }

    /// Full replace — the profile service is the source of truth.
    pub fn upsert(&self, profile: UserAdProfile) {
        self.profiles.insert(profile.user_id, profile);
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}
