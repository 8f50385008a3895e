use shared::{CreateProsthetist, Prosthetist, UpdateProsthetist};
use uuid::Uuid;

use super::{Resource, ResourceAccess};
use crate::remote::{Filter, Table};

pub type ProsthetistAccess = ResourceAccess<Prosthetist>;

impl Resource for Prosthetist {
    type Create = CreateProsthetist;
    type Update = UpdateProsthetist;

    const TABLE: Table = Table::Prosthetists;
    const ORDER_BY: &'static str = "name";

    fn id(&self) -> Uuid {
        self.id
    }

    fn company_id(&self) -> Uuid {
        self.company_id
    }

    fn search_filter(term: &str) -> Filter {
        Filter::or(vec![
            Filter::contains("name", term),
            Filter::contains("cnpj", term),
            Filter::contains("cpf", term),
        ])
    }

    fn validate_create(input: &CreateProsthetist) -> Result<(), String> {
        if input.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(())
    }

    fn validate_update(patch: &UpdateProsthetist) -> Result<(), String> {
        match &patch.name {
            Some(name) if name.trim().is_empty() => Err("name must not be empty".to_string()),
            _ => Ok(()),
        }
    }
}
