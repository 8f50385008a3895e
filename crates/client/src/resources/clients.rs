use shared::{Client, CreateClient, UpdateClient};
use uuid::Uuid;

use super::{Resource, ResourceAccess};
use crate::remote::{Filter, Table};

pub type ClientAccess = ResourceAccess<Client>;

impl Resource for Client {
    type Create = CreateClient;
    type Update = UpdateClient;

    const TABLE: Table = Table::Clients;
    const ORDER_BY: &'static str = "first_name";

    fn id(&self) -> Uuid {
        self.id
    }

    fn company_id(&self) -> Uuid {
        self.company_id
    }

    fn search_filter(term: &str) -> Filter {
        Filter::or(vec![
            Filter::contains("first_name", term),
            Filter::contains("last_name", term),
            Filter::contains("cpf_cnpj", term),
        ])
    }

    fn validate_create(input: &CreateClient) -> Result<(), String> {
        require_name("first_name", &input.first_name)?;
        require_name("last_name", &input.last_name)
    }

    fn validate_update(patch: &UpdateClient) -> Result<(), String> {
        if let Some(first_name) = &patch.first_name {
            require_name("first_name", first_name)?;
        }
        if let Some(last_name) = &patch.last_name {
            require_name("last_name", last_name)?;
        }
        Ok(())
    }
}

fn require_name(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Query;

    #[test]
    fn searches_names_and_document() {
        let params = Query::from(Table::Clients)
            .filter(Client::search_filter("silva"))
            .to_params();
        let or = params.iter().find(|(k, _)| k == "or").map(|(_, v)| v.as_str());
        assert_eq!(
            or,
            Some("(first_name.ilike.*silva*,last_name.ilike.*silva*,cpf_cnpj.ilike.*silva*)")
        );
    }

    #[test]
    fn blank_names_are_rejected() {
        let input = CreateClient {
            first_name: "Ana".to_string(),
            last_name: "  ".to_string(),
            ..CreateClient::default()
        };
        assert!(Client::validate_create(&input).is_err());
        assert!(Client::validate_update(&UpdateClient::default()).is_ok());
    }
}
