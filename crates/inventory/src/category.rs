use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pitstop_core::{Aggregate, AggregateId, AggregateRoot, BusinessId, DomainError};
use pitstop_events::Event;

/// Category identifier (business-scoped via `business_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub AggregateId);

impl CategoryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Category.
///
/// Groups stock items and declares which attribute fields items in the
/// category carry (e.g. a "Tires" category declaring "width" and "ratio").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: CategoryId,
    business_id: Option<BusinessId>,
    name: String,
    description: String,
    field_names: Vec<String>,
    compatible_vehicles: Vec<String>,
    version: u64,
    created: bool,
}

impl Category {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CategoryId) -> Self {
        Self {
            id,
            business_id: None,
            name: String::new(),
            description: String::new(),
            field_names: Vec::new(),
            compatible_vehicles: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CategoryId {
        self.id
    }

    pub fn business_id(&self) -> Option<BusinessId> {
        self.business_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }
}

impl AggregateRoot for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCategory {
    pub business_id: BusinessId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub field_names: Vec<String>,
    pub compatible_vehicles: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameCategory {
    pub business_id: BusinessId,
    pub category_id: CategoryId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryCommand {
    CreateCategory(CreateCategory),
    RenameCategory(RenameCategory),
}

/// Event: CategoryCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCreated {
    pub business_id: BusinessId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub field_names: Vec<String>,
    pub compatible_vehicles: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CategoryRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRenamed {
    pub business_id: BusinessId,
    pub category_id: CategoryId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryEvent {
    CategoryCreated(CategoryCreated),
    CategoryRenamed(CategoryRenamed),
}

impl Event for CategoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::CategoryCreated(_) => "inventory.category.created",
            CategoryEvent::CategoryRenamed(_) => "inventory.category.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CategoryEvent::CategoryCreated(e) => e.occurred_at,
            CategoryEvent::CategoryRenamed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Category {
    type Command = CategoryCommand;
    type Event = CategoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CategoryEvent::CategoryCreated(e) => {
                self.id = e.category_id;
                self.business_id = Some(e.business_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.field_names = e.field_names.clone();
                self.compatible_vehicles = e.compatible_vehicles.clone();
                self.created = true;
            }
            CategoryEvent::CategoryRenamed(e) => {
                self.name = e.name.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CategoryCommand::CreateCategory(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("category already exists"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                if cmd.field_names.iter().any(|f| f.trim().is_empty()) {
                    return Err(DomainError::validation("field names cannot be empty"));
                }

                Ok(vec![CategoryEvent::CategoryCreated(CategoryCreated {
                    business_id: cmd.business_id,
                    category_id: cmd.category_id,
                    name: cmd.name.clone(),
                    description: cmd.description.clone(),
                    field_names: cmd.field_names.clone(),
                    compatible_vehicles: cmd.compatible_vehicles.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            CategoryCommand::RenameCategory(cmd) => {
                if !self.created {
                    return Err(DomainError::NotFound);
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                if cmd.name == self.name {
                    return Ok(vec![]);
                }

                Ok(vec![CategoryEvent::CategoryRenamed(CategoryRenamed {
                    business_id: cmd.business_id,
                    category_id: cmd.category_id,
                    name: cmd.name.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_category_emits_created_event() {
        let category_id = CategoryId::new(AggregateId::new());
        let category = Category::empty(category_id);

        let events = category
            .handle(&CategoryCommand::CreateCategory(CreateCategory {
                business_id: BusinessId::new(),
                category_id,
                name: "Tires".to_string(),
                description: "All-season and winter tires".to_string(),
                field_names: vec!["width".to_string(), "ratio".to_string()],
                compatible_vehicles: vec!["sedan".to_string()],
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn rename_changes_name_and_is_a_noop_when_unchanged() {
        let business_id = BusinessId::new();
        let category_id = CategoryId::new(AggregateId::new());
        let mut category = Category::empty(category_id);

        let created = category
            .handle(&CategoryCommand::CreateCategory(CreateCategory {
                business_id,
                category_id,
                name: "Tires".to_string(),
                description: String::new(),
                field_names: vec![],
                compatible_vehicles: vec![],
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for ev in &created {
            category.apply(ev);
        }

        let renamed = category
            .handle(&CategoryCommand::RenameCategory(RenameCategory {
                business_id,
                category_id,
                name: "Wheels & Tires".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert_eq!(renamed.len(), 1);
        for ev in &renamed {
            category.apply(ev);
        }
        assert_eq!(category.name(), "Wheels & Tires");

        let noop = category
            .handle(&CategoryCommand::RenameCategory(RenameCategory {
                business_id,
                category_id,
                name: "Wheels & Tires".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(noop.is_empty());
    }

    #[test]
    fn rename_before_create_is_not_found() {
        let category_id = CategoryId::new(AggregateId::new());
        let category = Category::empty(category_id);

        let err = category
            .handle(&CategoryCommand::RenameCategory(RenameCategory {
                business_id: BusinessId::new(),
                category_id,
                name: "Tires".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn empty_name_is_rejected() {
        let category_id = CategoryId::new(AggregateId::new());
        let category = Category::empty(category_id);

        let err = category
            .handle(&CategoryCommand::CreateCategory(CreateCategory {
                business_id: BusinessId::new(),
                category_id,
                name: "  ".to_string(),
                description: String::new(),
                field_names: vec![],
                compatible_vehicles: vec![],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
