//! Within-session plan deduplication.
//!
//! The same logical plan often shows up three times in one session: the
//! user pastes it (embedded), a Plan subagent produced it (agent), and the
//! assistant writes it to disk (write). References that belong together
//! collapse into one, keeping the highest-priority source as canonical.

use jacques_types::PlanSource;

use crate::detect::DetectedPlan;

/// An agent/write reference joins an open group when its index is within
/// this many entries of the group anchor.
const GROUP_INDEX_WINDOW: usize = 10;

/// Collapse raw references into deduplicated ones, ordered by anchor index.
///
/// Canonical selection priority: write > embedded > agent. The merged
/// reference keeps the anchor (earliest) message index, the canonical
/// title and content, and the union of sources; `file_path` and
/// `agent_id` are carried forward from whichever member had them.
pub fn dedupe_within_session(mut raw: Vec<DetectedPlan>) -> Vec<DetectedPlan> {
    raw.sort_by_key(|r| r.message_index);

    let mut groups: Vec<Group> = Vec::new();
    for reference in raw {
        match groups.iter_mut().rev().find(|g| g.accepts(&reference)) {
            Some(group) => group.merge(reference),
            None => groups.push(Group::open(reference)),
        }
    }

    groups.into_iter().map(|g| g.plan).collect()
}

struct Group {
    plan: DetectedPlan,
    anchor_index: usize,
}

impl Group {
    fn open(reference: DetectedPlan) -> Self {
        let anchor_index = reference.message_index;
        Self {
            plan: reference,
            anchor_index,
        }
    }

    fn accepts(&self, reference: &DetectedPlan) -> bool {
        // Two embedded pastes are always distinct plans.
        if reference.source == PlanSource::Embedded {
            return false;
        }
        if titles_match(&self.plan.title, &reference.title) {
            return true;
        }
        // Proximity only joins across sources; two writes (or two agents)
        // near each other are two plans.
        reference.message_index.saturating_sub(self.anchor_index) <= GROUP_INDEX_WINDOW
            && !self.plan.sources.contains(&reference.source)
    }

    fn merge(&mut self, reference: DetectedPlan) {
        if reference.source.priority() < self.plan.source.priority() {
            self.plan.title = reference.title;
            self.plan.source = reference.source;
            if reference.content.is_some() {
                self.plan.content = reference.content;
            }
        } else if self.plan.content.is_none() {
            self.plan.content = reference.content;
        }

        if reference.file_path.is_some() {
            self.plan.file_path = reference.file_path;
        }
        if reference.agent_id.is_some() {
            self.plan.agent_id = reference.agent_id;
        }
        self.plan.sources.extend(reference.sources);
    }
}

fn titles_match(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim().to_lowercase();
    !a.trim().is_empty() && norm(a) == norm(b)
}
