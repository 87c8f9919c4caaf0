use std::sync::Arc;

use shared::{AuthService, Config};

use crate::domains::campaigns::CampaignService;
use crate::domains::customers::CustomerService;
use crate::domains::dashboard::DashboardService;
use crate::domains::mobile::MobileService;
use crate::domains::notifications::{dispatcher_from_config, NotificationDispatcher, NotificationService};
use crate::domains::points::PointsService;
use crate::domains::products::ProductService;
use crate::domains::segments::SegmentService;
use crate::domains::transactions::TransactionService;
use crate::domains::users::UserService;
use crate::store::{store_from_config, CrmStore};

/// Shared application state. Services are cheap handles over the same store.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CrmStore>,
    pub auth: Arc<AuthService>,
    pub users: UserService,
    pub customers: CustomerService,
    pub campaigns: CampaignService,
    pub segments: SegmentService,
    pub transactions: TransactionService,
    pub points: PointsService,
    pub products: ProductService,
    pub notifications: NotificationService,
    pub dashboard: DashboardService,
    pub mobile: MobileService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = store_from_config(&config).await?;
        let dispatcher = dispatcher_from_config(&config.notifications)?;
        Ok(Self::with_parts(config, store, dispatcher))
    }

    /// Assemble the state around an existing store and dispatcher
    pub fn with_parts(
        config: Config,
        store: Arc<dyn CrmStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let tz = config.app.timezone();
        let auth = Arc::new(AuthService::new(&config.auth));

        Self {
            users: UserService::new(store.clone(), auth.clone()),
            customers: CustomerService::new(store.clone()),
            campaigns: CampaignService::new(store.clone(), tz),
            segments: SegmentService::new(store.clone()),
            transactions: TransactionService::new(store.clone(), tz),
            points: PointsService::new(store.clone()),
            products: ProductService::new(store.clone()),
            notifications: NotificationService::new(store.clone(), dispatcher),
            dashboard: DashboardService::new(store.clone(), tz),
            mobile: MobileService::new(store.clone()),
            config: Arc::new(config),
            store,
            auth,
        }
    }
}
