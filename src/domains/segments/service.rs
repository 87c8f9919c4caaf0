//! Segment administration and automatic membership refresh

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use shared::error::{ensure_valid, field_errors_of, push_field_error};
use shared::{AppError, Page, PageRequest, Result};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::criteria::{PurchaseStats, SegmentCriteria};
use super::models::{RefreshOutcome, Segment, SegmentDetail, SegmentKind};
use crate::domains::context::Principal;
use crate::observability::record_segment_refresh;
use crate::store::{CrmStore, CustomerHistory};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentMode {
    #[default]
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSegmentRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default)]
    pub mode: SegmentMode,
    /// Typed `{ period, rules }` or the legacy flat object
    pub criteria: Option<Value>,
    /// Initial members of a manual segment
    #[serde(default)]
    pub customer_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateSegmentRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub criteria: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddMembersRequest {
    #[validate(length(min = 1, message = "Select at least one customer"))]
    pub customer_ids: Vec<Uuid>,
}

/// Customers whose aggregated history satisfies the criteria at `now`
pub fn matching_customers(
    criteria: &SegmentCriteria,
    histories: &[CustomerHistory],
    now: DateTime<Utc>,
) -> Vec<Uuid> {
    let since = criteria.period.since(now);
    histories
        .iter()
        .filter(|history| {
            let stats = PurchaseStats::from_purchases(
                &history.purchases,
                since,
                history.visit_count,
                history.points,
            );
            criteria.matches(&stats, now)
        })
        .map(|history| history.customer_id)
        .collect()
}

fn parse_criteria(raw: &Value) -> Result<SegmentCriteria> {
    SegmentCriteria::from_json(raw)
}

#[derive(Clone)]
pub struct SegmentService {
    store: Arc<dyn CrmStore>,
}

impl SegmentService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, principal: &Principal, page: PageRequest) -> Result<Page<Segment>> {
        principal.require_back_office()?;
        Ok(self.store.list_segments(principal.restaurant_id, page).await?)
    }

    pub async fn get(&self, principal: &Principal, segment_id: Uuid) -> Result<SegmentDetail> {
        principal.require_back_office()?;
        let segment = self.store.get_segment(principal.restaurant_id, segment_id).await?;
        let members = self.store.segment_members(segment.id).await?;
        Ok(SegmentDetail { segment, members })
    }

    pub async fn create(&self, principal: &Principal, request: CreateSegmentRequest) -> Result<SegmentDetail> {
        principal.require_back_office()?;
        let mut errors = field_errors_of(&request);

        let kind = match (request.mode, &request.criteria) {
            (SegmentMode::Manual, None) => Some(SegmentKind::Manual),
            (SegmentMode::Manual, Some(_)) => {
                push_field_error(&mut errors, "criteria", "Manual segments do not take criteria");
                None
            }
            (SegmentMode::Automatic, None) => {
                push_field_error(&mut errors, "criteria", "Automatic segments need criteria");
                None
            }
            (SegmentMode::Automatic, Some(raw)) => match parse_criteria(raw) {
                Ok(criteria) => Some(SegmentKind::Automatic { criteria }),
                Err(AppError::InvalidFields(problems)) => {
                    for (field, messages) in problems {
                        for message in messages {
                            push_field_error(&mut errors, field.clone(), message);
                        }
                    }
                    None
                }
                Err(e) => return Err(e),
            },
        };
        if request.mode == SegmentMode::Automatic && !request.customer_ids.is_empty() {
            push_field_error(&mut errors, "customer_ids", "Members of automatic segments come from a refresh");
        }
        ensure_valid(errors)?;
        let kind = kind.ok_or_else(|| AppError::internal("segment kind missing after validation"))?;

        let now = Utc::now();
        let segment = self
            .store
            .create_segment(Segment {
                id: Uuid::new_v4(),
                restaurant_id: principal.restaurant_id,
                name: request.name.trim().to_string(),
                description: request.description,
                kind,
                member_count: 0,
                last_refreshed_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        if !request.customer_ids.is_empty() {
            self.store.add_segment_members(segment.id, &request.customer_ids).await?;
        }

        info!(
            segment_id = %segment.id,
            automatic = segment.kind.is_automatic(),
            "Segment created"
        );
        self.get(principal, segment.id).await
    }

    pub async fn update(
        &self,
        principal: &Principal,
        segment_id: Uuid,
        request: UpdateSegmentRequest,
    ) -> Result<Segment> {
        principal.require_back_office()?;
        request.validate()?;
        let mut segment = self.store.get_segment(principal.restaurant_id, segment_id).await?;

        if let Some(name) = request.name {
            segment.name = name.trim().to_string();
        }
        if request.description.is_some() {
            segment.description = request.description;
        }
        if let Some(raw) = &request.criteria {
            if !segment.kind.is_automatic() {
                return Err(AppError::invalid_field("criteria", "Manual segments do not take criteria"));
            }
            segment.kind = SegmentKind::Automatic {
                criteria: parse_criteria(raw)?,
            };
        }
        segment.updated_at = Utc::now();

        let segment = self.store.update_segment(segment).await?;
        info!(segment_id = %segment.id, "Segment updated");
        Ok(segment)
    }

    pub async fn delete(&self, principal: &Principal, segment_id: Uuid) -> Result<()> {
        principal.require_admin()?;
        self.store.delete_segment(principal.restaurant_id, segment_id).await?;
        info!(segment_id = %segment_id, "Segment deleted");
        Ok(())
    }

    /// Returns how many customers joined
    pub async fn add_members(&self, principal: &Principal, segment_id: Uuid, request: AddMembersRequest) -> Result<i64> {
        principal.require_back_office()?;
        request.validate()?;
        let segment = self.manual_segment(principal, segment_id).await?;

        let added = self.store.add_segment_members(segment.id, &request.customer_ids).await?;
        info!(segment_id = %segment.id, added, "Segment members added");
        Ok(added)
    }

    pub async fn remove_member(&self, principal: &Principal, segment_id: Uuid, customer_id: Uuid) -> Result<()> {
        principal.require_back_office()?;
        let segment = self.manual_segment(principal, segment_id).await?;
        self.store.remove_segment_member(segment.id, customer_id).await?;
        info!(segment_id = %segment.id, customer_id = %customer_id, "Segment member removed");
        Ok(())
    }

    /// Recompute membership of an automatic segment from every customer's history
    pub async fn refresh(&self, principal: &Principal, segment_id: Uuid) -> Result<RefreshOutcome> {
        principal.require_back_office()?;
        let result = self.refresh_at(principal, segment_id, Utc::now()).await;
        record_segment_refresh(result.is_ok());
        result
    }

    async fn refresh_at(&self, principal: &Principal, segment_id: Uuid, now: DateTime<Utc>) -> Result<RefreshOutcome> {
        let segment = self.store.get_segment(principal.restaurant_id, segment_id).await?;
        let criteria = segment
            .kind
            .criteria()
            .ok_or_else(|| AppError::validation("Only automatic segments can be refreshed"))?;

        let histories = self.store.purchase_history(principal.restaurant_id).await?;
        let members = matching_customers(criteria, &histories, now);
        let outcome = self
            .store
            .replace_segment_members(segment.id, &members, now)
            .await?;

        info!(
            segment_id = %segment.id,
            added = outcome.added,
            removed = outcome.removed,
            total = outcome.total,
            "Segment refreshed"
        );
        Ok(outcome)
    }

    async fn manual_segment(&self, principal: &Principal, segment_id: Uuid) -> Result<Segment> {
        let segment = self.store.get_segment(principal.restaurant_id, segment_id).await?;
        if segment.kind.is_automatic() {
            warn!(segment_id = %segment.id, "Manual membership change on automatic segment");
            return Err(AppError::validation(
                "Members of automatic segments are managed by refresh",
            ));
        }
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::money::Money;
    use crate::domains::segments::criteria::PurchaseFact;
    use chrono::Duration;
    use serde_json::json;

    fn history(purchases: usize, amount_units: i64, now: DateTime<Utc>) -> CustomerHistory {
        CustomerHistory {
            customer_id: Uuid::new_v4(),
            visit_count: purchases as i64,
            points: 0,
            purchases: (0..purchases)
                .map(|i| PurchaseFact {
                    final_amount: Money::from_units(amount_units),
                    occurred_at: now - Duration::days(i as i64),
                })
                .collect(),
        }
    }

    #[test]
    fn matching_respects_every_rule() {
        let now = Utc::now();
        let criteria = SegmentCriteria::from_json(&json!({
            "period": "last_90_days",
            "purchaseCount": { "min": 3 },
            "averageOrderValue": { "min": "100.00" }
        }))
        .unwrap();

        let regular_big = history(5, 150, now);
        let regular_small = history(5, 40, now);
        let rare_big = history(2, 300, now);
        let never = history(0, 0, now);

        let members = matching_customers(
            &criteria,
            &[regular_big.clone(), regular_small, rare_big, never],
            now,
        );
        assert_eq!(members, vec![regular_big.customer_id]);
    }

    #[test]
    fn period_excludes_old_purchases() {
        let now = Utc::now();
        let criteria = SegmentCriteria::from_json(&json!({
            "period": "last_7_days",
            "purchaseCount": { "min": 5 }
        }))
        .unwrap();

        // ten purchases, one per day; days 0 to 7 fall inside the window
        let customer = history(10, 50, now);
        assert_eq!(matching_customers(&criteria, &[customer.clone()], now), vec![customer.customer_id]);

        let strict = SegmentCriteria::from_json(&json!({
            "period": "last_7_days",
            "purchaseCount": { "min": 9 }
        }))
        .unwrap();
        assert!(matching_customers(&strict, &[customer], now).is_empty());
    }
}
