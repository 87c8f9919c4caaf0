//! Order-level campaign rules: whether a campaign applies to a draft order
//! and how much it takes off.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{Campaign, DiscountRule};
use crate::domains::money::Money;

/// Upper bound on units per order line
pub const MAX_LINE_QUANTITY: i32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity.max(0) as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftOrder {
    pub items: Vec<OrderLine>,
}

impl DraftOrder {
    pub fn total(&self) -> Money {
        self.items.iter().map(OrderLine::line_total).sum()
    }

    fn lines_for<'a>(&'a self, products: &'a [Uuid]) -> impl Iterator<Item = &'a OrderLine> + 'a {
        self.items.iter().filter(move |line| {
            products.is_empty()
                || line
                    .product_id
                    .map(|id| products.contains(&id))
                    .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotApplicable {
    BelowMinimumPurchase { min_purchase: Money },
    OutsideValidHours,
    OutsideValidDays,
    NoTargetProducts,
}

/// Checks that depend on the order and the local clock, not on the customer
pub fn applies_to_order(
    campaign: &Campaign,
    order: &DraftOrder,
    local_now: NaiveDateTime,
) -> Result<(), NotApplicable> {
    if let Some(min_purchase) = campaign.min_purchase {
        if order.total() < min_purchase {
            return Err(NotApplicable::BelowMinimumPurchase { min_purchase });
        }
    }
    if let Some(hours) = campaign.valid_hours {
        if !hours.contains(local_now.time()) {
            return Err(NotApplicable::OutsideValidHours);
        }
    }
    if !campaign.valid_days.is_empty() && !campaign.valid_days.contains(&local_now.weekday()) {
        return Err(NotApplicable::OutsideValidDays);
    }
    if !campaign.target_products.is_empty()
        && order.lines_for(&campaign.target_products).next().is_none()
    {
        return Err(NotApplicable::NoTargetProducts);
    }
    Ok(())
}

/// Units of one order line given away
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreeItem {
    pub product_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Discount {
    pub amount: Money,
    pub free_items: Vec<FreeItem>,
}

/// Discount the campaign gives on this order, never more than the order total
pub fn discount_for_order(campaign: &Campaign, order: &DraftOrder) -> Discount {
    let order_total = order.total();
    let mut discount = match &campaign.discount {
        DiscountRule::Percentage { percent } => {
            let base: Money = order
                .lines_for(&campaign.target_products)
                .map(OrderLine::line_total)
                .sum();
            Discount {
                amount: base.percent_of(*percent),
                free_items: Vec::new(),
            }
        }
        DiscountRule::FixedAmount { amount } => Discount {
            amount: *amount,
            free_items: Vec::new(),
        },
        DiscountRule::FreeItem => {
            let eligible = if campaign.free_products.is_empty() {
                &campaign.target_products
            } else {
                &campaign.free_products
            };
            order
                .lines_for(eligible)
                .filter(|line| line.quantity > 0)
                .min_by_key(|line| line.unit_price)
                .map(|line| Discount {
                    amount: line.unit_price,
                    free_items: vec![FreeItem {
                        product_name: line.product_name.clone(),
                        quantity: 1,
                    }],
                })
                .unwrap_or_default()
        }
        DiscountRule::BuyOneGetOne => buy_one_get_one(order.lines_for(&campaign.target_products)),
    };

    discount.amount = discount.amount.min(order_total).max(Money::ZERO);
    discount
}

/// Units priced high to low; every second unit is free. Works per line so the
/// cost does not depend on quantities.
fn buy_one_get_one<'a>(lines: impl Iterator<Item = &'a OrderLine>) -> Discount {
    let mut lines: Vec<&OrderLine> = lines.filter(|line| line.quantity > 0).collect();
    lines.sort_by(|a, b| b.unit_price.cmp(&a.unit_price));

    let mut discount = Discount::default();
    let mut position: i64 = 0;
    for line in lines {
        let quantity = i64::from(line.quantity);
        let end = position + quantity;
        // odd positions in [position, end)
        let free = end / 2 - position / 2;
        position = end;
        if free > 0 {
            discount.amount += line.unit_price.times(free);
            discount.free_items.push(FreeItem {
                product_name: line.product_name.clone(),
                quantity: free,
            });
        }
    }
    discount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::campaigns::models::tests::campaign_fixture;
    use crate::domains::campaigns::models::ValidHours;
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use rust_decimal::Decimal;

    fn line(product_id: Uuid, name: &str, quantity: i32, price_minor: i64) -> OrderLine {
        OrderLine {
            product_id: Some(product_id),
            product_name: name.to_string(),
            quantity,
            unit_price: Money::from_minor(price_minor),
        }
    }

    fn monday_noon() -> NaiveDateTime {
        // 2025-01-06 is a Monday
        NaiveDate::from_ymd_opt(2025, 1, 6)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn percentage_only_counts_target_lines() {
        let latte = Uuid::new_v4();
        let mut campaign = campaign_fixture();
        campaign.target_products = vec![latte];
        let order = DraftOrder {
            items: vec![line(latte, "Latte", 2, 4550), line(Uuid::new_v4(), "Sandviç", 1, 12000)],
        };

        let discount = discount_for_order(&campaign, &order);
        // 20% of 91.00
        assert_eq!(discount.amount, Money::from_minor(1820));
    }

    #[test]
    fn fixed_amount_never_exceeds_total() {
        let mut campaign = campaign_fixture();
        campaign.discount = DiscountRule::FixedAmount {
            amount: Money::from_units(50),
        };
        let order = DraftOrder {
            items: vec![line(Uuid::new_v4(), "Çay", 1, 1500)],
        };
        assert_eq!(discount_for_order(&campaign, &order).amount, Money::from_minor(1500));
    }

    #[test]
    fn free_item_picks_cheapest_free_product() {
        let cookie = Uuid::new_v4();
        let cake = Uuid::new_v4();
        let mut campaign = campaign_fixture();
        campaign.discount = DiscountRule::FreeItem;
        campaign.free_products = vec![cookie, cake];
        let order = DraftOrder {
            items: vec![line(cake, "Cheesecake", 1, 9000), line(cookie, "Kurabiye", 2, 2500)],
        };

        let discount = discount_for_order(&campaign, &order);
        assert_eq!(discount.amount, Money::from_minor(2500));
        assert_eq!(
            discount.free_items,
            vec![FreeItem {
                product_name: "Kurabiye".to_string(),
                quantity: 1
            }]
        );
    }

    #[test]
    fn buy_one_get_one_frees_cheaper_unit_of_each_pair() {
        let burger = Uuid::new_v4();
        let mut campaign = campaign_fixture();
        campaign.discount = DiscountRule::BuyOneGetOne;
        let order = DraftOrder {
            items: vec![line(burger, "Burger", 3, 20000), line(Uuid::new_v4(), "Wrap", 1, 15000)],
        };

        // units sorted: 200, 200, 200, 150 -> free: 200 and 150
        let discount = discount_for_order(&campaign, &order);
        assert_eq!(discount.amount, Money::from_minor(35000));
        let free: Vec<(&str, i64)> = discount
            .free_items
            .iter()
            .map(|item| (item.product_name.as_str(), item.quantity))
            .collect();
        assert_eq!(free, vec![("Burger", 1), ("Wrap", 1)]);
    }

    #[test]
    fn buy_one_get_one_counts_units_without_expanding_them() {
        let mut campaign = campaign_fixture();
        campaign.discount = DiscountRule::BuyOneGetOne;
        let order = DraftOrder {
            items: vec![
                line(Uuid::new_v4(), "Su", i32::MAX, 1),
                line(Uuid::new_v4(), "Baklava", 3, 500),
            ],
        };

        // 500, 500, 500 then i32::MAX units at 1: free = one baklava plus
        // every second water starting at position 3
        let discount = discount_for_order(&campaign, &order);
        let water_free = (3 + i64::from(i32::MAX)) / 2 - 1;
        assert_eq!(
            discount.free_items,
            vec![
                FreeItem {
                    product_name: "Baklava".to_string(),
                    quantity: 1
                },
                FreeItem {
                    product_name: "Su".to_string(),
                    quantity: water_free
                },
            ]
        );
        assert_eq!(discount.amount, Money::from_minor(500 + water_free));
    }

    #[test]
    fn order_rules_check_minimum_hours_and_days() {
        let mut campaign = campaign_fixture();
        campaign.min_purchase = Some(Money::from_units(100));
        campaign.valid_hours = Some(ValidHours {
            start: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        });
        campaign.valid_days = vec![Weekday::Mon, Weekday::Tue];

        let small = DraftOrder {
            items: vec![line(Uuid::new_v4(), "Çorba", 1, 6000)],
        };
        let big = DraftOrder {
            items: vec![line(Uuid::new_v4(), "Menü", 1, 12000)],
        };

        assert_eq!(
            applies_to_order(&campaign, &small, monday_noon()),
            Err(NotApplicable::BelowMinimumPurchase {
                min_purchase: Money::from_units(100)
            })
        );
        assert_eq!(applies_to_order(&campaign, &big, monday_noon()), Ok(()));
        assert_eq!(
            applies_to_order(&campaign, &big, monday_noon() + chrono::Duration::hours(5)),
            Err(NotApplicable::OutsideValidHours)
        );
        assert_eq!(
            applies_to_order(&campaign, &big, monday_noon() + chrono::Duration::days(2)),
            Err(NotApplicable::OutsideValidDays)
        );
    }

    #[test]
    fn percentage_rounds_down() {
        let mut campaign = campaign_fixture();
        campaign.discount = DiscountRule::Percentage {
            percent: Decimal::new(125, 1),
        };
        let order = DraftOrder {
            items: vec![line(Uuid::new_v4(), "Pide", 1, 3333)],
        };
        // 12.5% of 33.33 = 4.16625
        assert_eq!(discount_for_order(&campaign, &order).amount, Money::from_minor(416));
    }
}
