use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{InstructorId, UserId, WorkoutId};

/// Authenticated user's profile from `/api/me`.
///
/// Only the fields the client relies on are typed; the rest of the payload
/// is kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// User preferences from `/api/user/{id}/settings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserSettings {
    /// `"imperial"` or `"metric"`.
    #[serde(default)]
    pub distance_unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One workout with its performance graph and instructor name attached.
///
/// Serializes as the upstream workout detail object with two extra keys,
/// `performance_graph` and `instructor_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct WorkoutRecord {
    pub id: WorkoutId,
    #[serde(default)]
    pub performance_graph: Value,
    #[serde(default)]
    pub instructor_name: Option<String>,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl WorkoutRecord {
    /// The workout's `ride` object, if present and not null.
    #[must_use]
    pub fn ride(&self) -> Option<&Map<String, Value>> {
        self.detail.get("ride").and_then(Value::as_object)
    }

    /// Where the instructor's display name has to come from.
    pub(crate) fn instructor_ref(&self) -> InstructorRef {
        let Some(ride) = self.ride() else {
            return InstructorRef::Missing;
        };

        if let Some(id) = ride
            .get("instructor_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        {
            return InstructorRef::Lookup(InstructorId(id.to_owned()));
        }

        match ride.get("instructor").and_then(Value::as_object) {
            Some(instructor) => InstructorRef::Embedded(
                instructor
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            ),
            None => InstructorRef::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InstructorRef {
    /// Only an id is known; the name needs a secondary lookup.
    Lookup(InstructorId),
    /// The ride embeds an instructor object.
    Embedded(Option<String>),
    Missing,
}

/// Page of the workout list endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct WorkoutPage {
    #[serde(default)]
    pub(crate) data: Vec<WorkoutSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkoutSummary {
    pub(crate) id: WorkoutId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Instructor {
    #[serde(default)]
    pub(crate) name: Option<String>,
}
