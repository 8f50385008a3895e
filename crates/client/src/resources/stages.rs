use shared::{CreateStage, Stage, UpdateStage};
use uuid::Uuid;

use super::{Resource, ResourceAccess};
use crate::remote::{Filter, Table};

pub type StageAccess = ResourceAccess<Stage>;

impl Resource for Stage {
    type Create = CreateStage;
    type Update = UpdateStage;

    const TABLE: Table = Table::Stages;
    const ORDER_BY: &'static str = "name";

    fn id(&self) -> Uuid {
        self.id
    }

    fn company_id(&self) -> Uuid {
        self.company_id
    }

    fn search_filter(term: &str) -> Filter {
        Filter::contains("name", term)
    }

    fn validate_create(input: &CreateStage) -> Result<(), String> {
        if input.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        check_days(Some(input.min_days), Some(input.max_days))
    }

    /// A patch carrying only one bound is checked for sign only; the
    /// database constraint covers the rest.
    fn validate_update(patch: &UpdateStage) -> Result<(), String> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err("name must not be empty".to_string());
            }
        }
        check_days(patch.min_days, patch.max_days)
    }
}

fn check_days(min_days: Option<i32>, max_days: Option<i32>) -> Result<(), String> {
    if min_days.is_some_and(|d| d < 0) || max_days.is_some_and(|d| d < 0) {
        return Err("durations must not be negative".to_string());
    }
    if let (Some(min), Some(max)) = (min_days, max_days) {
        if min > max {
            return Err(format!("min_days ({}) exceeds max_days ({})", min, max));
        }
    }
    Ok(())
}
