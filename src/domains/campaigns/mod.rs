pub mod discount;
pub mod eligibility;
pub mod models;
pub mod service;

pub use discount::{applies_to_order, discount_for_order, Discount, DraftOrder, FreeItem, OrderLine};
pub use eligibility::{eligible_campaigns, ineligibility_reason, is_eligible, EligibilityContext, Ineligibility};
pub use models::{Campaign, CampaignType, DiscountRule};
pub use service::CampaignService;
