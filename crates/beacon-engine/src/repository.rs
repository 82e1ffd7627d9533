//! Asset, subscription, and project lookups used by command handlers.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub subscription_id: Uuid,
}

/// Read-only lookup surface over the application's data.
///
/// Name lookups are case-insensitive.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn asset_by_id(&self, id: Uuid) -> Option<Asset>;
    async fn asset_by_name(&self, name: &str) -> Option<Asset>;
    async fn subscription_by_name(&self, name: &str) -> Option<Subscription>;
    /// Find a project by name, restricted to `subscription_id` when given.
    async fn project_by_name(&self, name: &str, subscription_id: Option<Uuid>) -> Option<Project>;
    async fn assets(&self) -> Vec<Asset>;
}

/// Fixed in-memory data set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    assets: Vec<Asset>,
    subscriptions: Vec<Subscription>,
    projects: Vec<Project>,
}

impl InMemoryRepository {
    pub fn new(assets: Vec<Asset>, subscriptions: Vec<Subscription>, projects: Vec<Project>) -> Self {
        Self {
            assets,
            subscriptions,
            projects,
        }
    }

    /// Demo data: three assets, two subscriptions, one project in each.
    pub fn seeded() -> Self {
        let assets = ["Pump 001", "Boiler 002", "Palletizer 100"]
            .into_iter()
            .map(|name| Asset {
                id: Uuid::new_v4(),
                name: name.to_string(),
            })
            .collect();

        let subscriptions: Vec<Subscription> = ["Subscription 001", "Subscription 002"]
            .into_iter()
            .map(|name| Subscription {
                id: Uuid::new_v4(),
                name: name.to_string(),
            })
            .collect();

        let projects = ["Project 001", "Project 002"]
            .into_iter()
            .zip(&subscriptions)
            .map(|(name, subscription)| Project {
                id: Uuid::new_v4(),
                name: name.to_string(),
                subscription_id: subscription.id,
            })
            .collect();

        Self::new(assets, subscriptions, projects)
    }
}

#[async_trait]
impl AssetRepository for InMemoryRepository {
    async fn asset_by_id(&self, id: Uuid) -> Option<Asset> {
        self.assets.iter().find(|a| a.id == id).cloned()
    }

    async fn asset_by_name(&self, name: &str) -> Option<Asset> {
        let name = name.trim();
        self.assets
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    async fn subscription_by_name(&self, name: &str) -> Option<Subscription> {
        let name = name.trim();
        self.subscriptions
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    async fn project_by_name(&self, name: &str, subscription_id: Option<Uuid>) -> Option<Project> {
        let name = name.trim();
        self.projects
            .iter()
            .filter(|p| subscription_id.map_or(true, |id| p.subscription_id == id))
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    async fn assets(&self) -> Vec<Asset> {
        self.assets.clone()
    }
}
