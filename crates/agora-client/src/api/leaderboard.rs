//! Points leaderboard and platform statistics

use crate::client::CommunityClient;
use crate::keys;
use crate::query::Query;
use agora_core::{LeaderboardEntry, Statistics};

impl CommunityClient {
    /// Members ranked by points
    #[must_use]
    pub fn leaderboard(&self) -> Query<Vec<LeaderboardEntry>> {
        self.query(keys::leaderboard(), self.connected(), |backend| async move {
            backend.get_leaderboard().await
        })
    }

    /// Platform-wide counters
    #[must_use]
    pub fn statistics(&self) -> Query<Statistics> {
        self.query(keys::statistics(), self.connected(), |backend| async move {
            backend.get_statistics().await
        })
    }
}
