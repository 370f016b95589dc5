//! Leaderboard aggregation
//!
//! Keeps the latest summary per username and rebuilds the full ranking on
//! every update. Ranking: earnings descending, then total shares ascending
//! (reaching the same earnings with less volume ranks higher), then username
//! ascending. Entries live in a `BTreeMap`, so the stable sort leaves
//! username order in place for exact ties.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::broker::message::{LeaderboardEntry, PortfolioSummary};

/// Which usernames may appear on the leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cohort {
    #[default]
    Open,
    Members(HashSet<String>),
}

impl Cohort {
    /// An empty member list admits everyone.
    pub fn from_members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members: HashSet<String> = members.into_iter().map(Into::into).collect();
        if members.is_empty() {
            Cohort::Open
        } else {
            Cohort::Members(members)
        }
    }

    pub fn admits(&self, username: &str) -> bool {
        match self {
            Cohort::Open => true,
            Cohort::Members(members) => members.contains(username),
        }
    }
}

#[derive(Debug, Default)]
pub struct Leaderboard {
    entries: BTreeMap<String, PortfolioSummary>,
    cohort: Cohort,
}

impl Leaderboard {
    pub fn new(cohort: Cohort) -> Self {
        Self {
            entries: BTreeMap::new(),
            cohort,
        }
    }

    /// Upsert `username`'s summary and return the new ranking, or `None` if
    /// the cohort does not admit the user.
    pub fn update(
        &mut self,
        username: &str,
        mut summary: PortfolioSummary,
    ) -> Option<Vec<LeaderboardEntry>> {
        if !self.cohort.admits(username) {
            return None;
        }
        // the entry carries its own username field
        summary.extra.remove("username");
        self.entries.insert(username.to_string(), summary);
        Some(self.snapshot())
    }

    pub fn snapshot(&self) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<LeaderboardEntry> = self
            .entries
            .iter()
            .map(|(username, summary)| LeaderboardEntry {
                username: username.clone(),
                summary: summary.clone(),
            })
            .collect();
        ranked.sort_by(|a, b| rank(&a.summary, &b.summary));
        ranked
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn rank(a: &PortfolioSummary, b: &PortfolioSummary) -> Ordering {
    b.earnings
        .total_cmp(&a.earnings)
        .then_with(|| a.total_shares.total_cmp(&b.total_shares))
}
