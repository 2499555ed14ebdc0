//! Matching queue: submit, rank and atomically claim pairs
//!
//! Candidates are read, filtered and scored outside of any lock. The only
//! write is the conditional pair claim, so a search that loses a race sees
//! "no match this round" and its own entry stays `searching`.

use crate::config::MatchingSettings;
use crate::error::{BondError, Result};
use crate::matching::factory::RelationshipFactory;
use crate::matching::roles::Role;
use crate::matching::scorer::{CandidateProfile, MatchScorer, RequesterProfile, ScoreBreakdown};
use crate::metrics::MetricsCollector;
use crate::storage::{ProfileRepository, QueueRepository, RelationshipRepository};
use crate::types::*;
use crate::utils::{current_timestamp, generate_id, RandomSource};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MIN_AGE: u8 = 13;
const MAX_AGE: u8 = 120;

/// Result of a successful claim
#[derive(Debug, Clone)]
pub struct ClaimedMatch {
    pub relationship: Relationship,
    pub partner_id: UserId,
    pub score: ScoreBreakdown,
}

struct RankedCandidate {
    entry: MatchRequest,
    score: ScoreBreakdown,
}

/// Queue of pending match requests
pub struct MatchQueue {
    queue: Arc<dyn QueueRepository>,
    profiles: Arc<dyn ProfileRepository>,
    relationships: Arc<dyn RelationshipRepository>,
    scorer: Arc<dyn MatchScorer>,
    factory: RelationshipFactory,
    rng: Arc<RandomSource>,
    settings: MatchingSettings,
    metrics: Option<Arc<MetricsCollector>>,
    claim_conflicts: AtomicU64,
}

impl MatchQueue {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        profiles: Arc<dyn ProfileRepository>,
        relationships: Arc<dyn RelationshipRepository>,
        scorer: Arc<dyn MatchScorer>,
        rng: Arc<RandomSource>,
        settings: MatchingSettings,
    ) -> Self {
        Self {
            queue,
            profiles,
            relationships,
            scorer,
            factory: RelationshipFactory::new(),
            rng,
            settings,
            metrics: None,
            claim_conflicts: AtomicU64::new(0),
        }
    }

    /// Report lost claim races to a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Claims lost to concurrent searches since startup
    pub fn claim_conflicts(&self) -> u64 {
        self.claim_conflicts.load(Ordering::Relaxed)
    }

    fn validate_role(&self, role: &Role, field: &str) -> Result<()> {
        if role.as_str().is_empty() {
            return Err(BondError::validation(format!("{} must not be empty", field)));
        }
        if !role.is_known() && !self.settings.allow_custom_roles {
            return Err(BondError::validation(format!("unknown {}: {}", field, role)));
        }
        Ok(())
    }

    fn validate_criteria(&self, criteria: &SearchCriteria) -> Result<()> {
        self.validate_role(&criteria.seeking_role, "seeking role")?;
        self.validate_role(&criteria.offering_role, "offering role")?;

        let ages = criteria.preferred_age_range;
        if ages.min > ages.max || ages.min < MIN_AGE || ages.max > MAX_AGE {
            return Err(BondError::validation(format!(
                "malformed age range {}..{}",
                ages.min, ages.max
            )));
        }
        Ok(())
    }

    /// Enter the queue, superseding any earlier live entry of the same user
    pub async fn submit(&self, user_id: &str, criteria: SearchCriteria) -> Result<QueueTicket> {
        self.validate_criteria(&criteria)?;

        let profile = self
            .profiles
            .get_profile(user_id)
            .await?
            .ok_or_else(|| BondError::not_found("profile", user_id))?;
        if profile.is_banned {
            return Err(BondError::validation("account is banned"));
        }

        let entry = MatchRequest {
            id: generate_id(),
            user_id: user_id.to_string(),
            seeking_role: criteria.seeking_role,
            offering_role: criteria.offering_role,
            preferred_age_range: criteria.preferred_age_range,
            preferred_countries: criteria.preferred_countries,
            language_priority: criteria.language_priority,
            status: QueueStatus::Searching,
            matched_with: None,
            created_at: current_timestamp(),
            matched_at: None,
        };

        let cancelled_entries = self.queue.enqueue(entry.clone()).await?;
        if !cancelled_entries.is_empty() {
            debug!(
                "User {} superseded {} earlier search entries",
                user_id,
                cancelled_entries.len()
            );
        }

        let queue_position = self.queue_position(&entry).await?;
        info!(
            "User {} queued seeking {} offering {} (position {})",
            user_id, entry.seeking_role, entry.offering_role, queue_position
        );

        Ok(QueueTicket {
            entry_id: entry.id,
            user_id: entry.user_id,
            queue_position,
            cancelled_entries,
        })
    }

    /// Pick the best candidate for `user_id` and claim both entries.
    ///
    /// Returns `None` when nobody fits or when the chosen candidate was
    /// claimed by a concurrent search first.
    pub async fn find_and_claim(
        &self,
        user_id: &str,
        seeking_role: &Role,
        offering_role: &Role,
    ) -> Result<Option<ClaimedMatch>> {
        let requester_entry = match self.queue.searching_entry_for(user_id).await? {
            Some(entry) => entry,
            None => {
                debug!("User {} has no live search entry", user_id);
                return Ok(None);
            }
        };

        let ranked = self
            .rank_candidates(&requester_entry, seeking_role, offering_role)
            .await?;
        let best = match ranked.into_iter().next() {
            Some(best) => best,
            None => {
                debug!("No candidates for user {}", user_id);
                return Ok(None);
            }
        };

        let relationship = self.factory.pair(&requester_entry, &best.entry);
        let milestone = self.factory.first_milestone(&relationship);
        match self
            .queue
            .claim_pair(requester_entry.id, best.entry.id, relationship, milestone)
            .await
        {
            Ok(relationship) => {
                info!(
                    "Matched {} with {} (score {}), relationship {}",
                    user_id,
                    best.entry.user_id,
                    best.score.total(),
                    relationship.id
                );
                Ok(Some(ClaimedMatch {
                    relationship,
                    partner_id: best.entry.user_id,
                    score: best.score,
                }))
            }
            Err(BondError::Conflict { reason }) => {
                warn!(
                    "Claim of {} by {} lost a race: {}",
                    best.entry.user_id, user_id, reason
                );
                self.claim_conflicts.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_claim_conflict();
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Candidates ordered best first; equal totals go to the older entry
    async fn rank_candidates(
        &self,
        requester_entry: &MatchRequest,
        seeking_role: &Role,
        offering_role: &Role,
    ) -> Result<Vec<RankedCandidate>> {
        let user_id = requester_entry.user_id.as_str();
        let entries = self
            .queue
            .list_searching(&offering_role.complement(), &seeking_role.complement())
            .await?;
        let partners = self.relationships.active_partners_of(user_id).await?;

        let requester = RequesterProfile {
            user_id: user_id.to_string(),
            languages: self.languages_of(user_id).await?,
            language_priority: requester_entry.language_priority,
        };

        let mut ranked = Vec::new();
        for entry in entries {
            if entry.user_id == user_id || partners.contains(&entry.user_id) {
                continue;
            }
            let profile = match self.profiles.get_profile(&entry.user_id).await? {
                Some(profile) if !profile.is_banned => profile,
                _ => continue,
            };

            let candidate = CandidateProfile {
                user_id: profile.user_id.clone(),
                languages: self.languages_of(&entry.user_id).await?,
                is_verified: profile.is_verified,
                care_score: profile.care_score,
                reliability_score: profile.reliability_score,
            };
            let jitter = self.scorer.draw_jitter(&self.rng);
            let score = self.scorer.score(&requester, &candidate, jitter);
            debug!(
                "Candidate {} for {} scored {} ({:?})",
                entry.user_id,
                user_id,
                score.total(),
                score
            );
            ranked.push(RankedCandidate { entry, score });
        }

        ranked.sort_by(|a, b| {
            b.score
                .total()
                .cmp(&a.score.total())
                .then_with(|| a.entry.created_at.cmp(&b.entry.created_at))
        });
        Ok(ranked)
    }

    async fn languages_of(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .profiles
            .get_languages(user_id)
            .await?
            .into_iter()
            .map(|code| code.to_lowercase())
            .collect())
    }

    /// Leave the queue; calling it with no live entry is a no-op
    pub async fn cancel(&self, user_id: &str) -> Result<Vec<EntryId>> {
        let cancelled = self.queue.cancel_searching(user_id).await?;
        if !cancelled.is_empty() {
            info!("User {} left the matching queue", user_id);
        }
        Ok(cancelled)
    }

    /// The user's live search entry, if any
    pub async fn status(&self, user_id: &str) -> Result<Option<MatchRequest>> {
        self.queue.searching_entry_for(user_id).await
    }

    /// 1-based position among entries seeking the same role
    pub async fn queue_position(&self, entry: &MatchRequest) -> Result<usize> {
        self.queue
            .count_searching_since(&entry.seeking_role, entry.created_at)
            .await
    }

    pub async fn get_entry(&self, entry_id: EntryId) -> Result<Option<MatchRequest>> {
        self.queue.get_entry(entry_id).await
    }
}
