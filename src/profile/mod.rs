mod models;
mod store;

pub use models::{
    ActivityEvent, ActivityType, ListeningHistoryEntry, PreferencesUpdate, RealtimeProfile,
    SearchHistoryEntry, SongAggregate, SongInteraction, UserPreferences,
    MAX_PROFILE_INTERACTIONS, MAX_PROFILE_SEARCH_TERMS,
};
pub use store::{ProfileStore, TreeProfileStore};
