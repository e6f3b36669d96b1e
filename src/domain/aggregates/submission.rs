//! Submitted Product Aggregate
//!
//! A customer uploads a garment, applies a design to it and sends it for
//! review. Admins approve it into the catalog or reject it with a reason.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::product::{validate_price, CatalogProductInput, ProductDetails};
use crate::domain::events::{DomainEvent, SubmissionEvent};
use crate::domain::text_enum;

text_enum! {
    pub enum SubmissionStatus {
        Pending => "pending",
        UnderReview => "under_review",
        Approved => "approved",
        Rejected => "rejected",
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct SubmittedProduct {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: Option<String>,
    category: String,
    base_price: Decimal,
    images: Vec<String>,
    #[sqlx(try_from = "String")]
    status: SubmissionStatus,
    design_id: Option<Uuid>,
    rejection_reason: Option<String>,
    catalog_product_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct SubmissionInput {
    #[validate(length(min = 1, max = 160))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: String,
    #[validate(custom = "validate_price")]
    pub base_price: Decimal,
    #[validate(length(min = 1, max = 8))]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("cannot {action} a submission that is {status}")]
    IllegalTransition { action: &'static str, status: SubmissionStatus },
    #[error("apply a design before sending the product for review")]
    DesignMissing,
    #[error("a rejection reason is required")]
    ReasonRequired,
}

impl SubmittedProduct {
    pub fn submit(user_id: Uuid, input: SubmissionInput, now: DateTime<Utc>) -> Self {
        let mut submission = Self {
            id: Uuid::now_v7(), user_id, name: input.name, description: input.description,
            category: input.category, base_price: input.base_price, images: input.images,
            status: SubmissionStatus::Pending, design_id: None, rejection_reason: None,
            catalog_product_id: None, created_at: now, updated_at: now, events: vec![],
        };
        submission.raise_event(SubmissionEvent::Submitted { submission_id: submission.id, user_id });
        submission
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn name(&self) -> &str { &self.name }
    pub fn status(&self) -> SubmissionStatus { self.status }
    pub fn design_id(&self) -> Option<Uuid> { self.design_id }
    pub fn base_price(&self) -> Decimal { self.base_price }
    pub fn images(&self) -> &[String] { &self.images }
    pub fn rejection_reason(&self) -> Option<&str> { self.rejection_reason.as_deref() }
    pub fn catalog_product_id(&self) -> Option<Uuid> { self.catalog_product_id }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn category(&self) -> &str { &self.category }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Returns the previously applied design when this one replaces it.
    pub fn apply_design(&mut self, design_id: Uuid, now: DateTime<Utc>) -> Result<Option<Uuid>, SubmissionError> {
        self.require(SubmissionStatus::Pending, "apply a design to")?;
        let replaced = self.design_id.replace(design_id).filter(|previous| *previous != design_id);
        self.updated_at = now;
        self.raise_event(SubmissionEvent::DesignApplied { submission_id: self.id, design_id });
        Ok(replaced)
    }

    pub fn send_for_review(&mut self, now: DateTime<Utc>) -> Result<(), SubmissionError> {
        self.require(SubmissionStatus::Pending, "review")?;
        if self.design_id.is_none() { return Err(SubmissionError::DesignMissing); }
        self.status = SubmissionStatus::UnderReview;
        self.updated_at = now;
        self.raise_event(SubmissionEvent::ReviewStarted { submission_id: self.id });
        Ok(())
    }

    /// Catalog listing the submission becomes once approved.
    pub fn catalog_input(&self, stock: i32, sizes: Vec<String>, colors: Vec<String>) -> CatalogProductInput {
        CatalogProductInput {
            details: ProductDetails {
                name: self.name.clone(), description: self.description.clone(), category: self.category.clone(),
                price: self.base_price, compare_at_price: None, images: self.images.clone(), sizes, colors,
            },
            stock,
        }
    }

    pub fn approve(&mut self, catalog_product_id: Uuid, now: DateTime<Utc>) -> Result<(), SubmissionError> {
        self.require(SubmissionStatus::UnderReview, "approve")?;
        self.status = SubmissionStatus::Approved;
        self.catalog_product_id = Some(catalog_product_id);
        self.rejection_reason = None;
        self.updated_at = now;
        self.raise_event(SubmissionEvent::Approved { submission_id: self.id, catalog_product_id });
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), SubmissionError> {
        self.require(SubmissionStatus::UnderReview, "reject")?;
        let reason = reason.trim();
        if reason.is_empty() { return Err(SubmissionError::ReasonRequired); }
        self.status = SubmissionStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.updated_at = now;
        self.raise_event(SubmissionEvent::Rejected { submission_id: self.id, reason: reason.to_string() });
        Ok(())
    }

    fn require(&self, status: SubmissionStatus, action: &'static str) -> Result<(), SubmissionError> {
        if self.status == status { Ok(()) } else { Err(SubmissionError::IllegalTransition { action, status: self.status }) }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: SubmissionEvent) { self.events.push(DomainEvent::Submission(e)); }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> SubmittedProduct {
        SubmittedProduct::submit(Uuid::new_v4(), SubmissionInput {
            name: "Hand-block Shirt".into(), description: None, category: "shirts".into(),
            base_price: Decimal::new(1899, 0), images: vec!["https://cdn.example/a.png".into()],
        }, Utc::now())
    }

    #[test]
    fn test_reapplying_design_reports_replaced_one() {
        let mut s = submission();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert_eq!(s.apply_design(first, Utc::now()), Ok(None));
        assert_eq!(s.apply_design(first, Utc::now()), Ok(None));
        assert_eq!(s.apply_design(second, Utc::now()), Ok(Some(first)));
        assert_eq!(s.design_id(), Some(second));
    }

    #[test]
    fn test_moderation_flow() {
        let mut s = submission();
        assert_eq!(s.status(), SubmissionStatus::Pending);
        assert_eq!(s.send_for_review(Utc::now()), Err(SubmissionError::DesignMissing));

        let design = Uuid::new_v4();
        assert_eq!(s.apply_design(design, Utc::now()), Ok(None));
        s.send_for_review(Utc::now()).unwrap();
        assert_eq!(s.status(), SubmissionStatus::UnderReview);
        assert!(s.apply_design(Uuid::new_v4(), Utc::now()).is_err());

        let listing = Uuid::new_v4();
        s.approve(listing, Utc::now()).unwrap();
        assert_eq!(s.status(), SubmissionStatus::Approved);
        assert_eq!(s.catalog_product_id(), Some(listing));
        assert_eq!(s.take_events().len(), 4);
    }

    #[test]
    fn test_only_reviewed_submissions_are_moderated() {
        let mut s = submission();
        assert_eq!(
            s.approve(Uuid::new_v4(), Utc::now()),
            Err(SubmissionError::IllegalTransition { action: "approve", status: SubmissionStatus::Pending })
        );
        s.apply_design(Uuid::new_v4(), Utc::now()).unwrap();
        s.send_for_review(Utc::now()).unwrap();
        assert_eq!(s.reject("   ", Utc::now()), Err(SubmissionError::ReasonRequired));
        s.reject("Print resolution too low", Utc::now()).unwrap();
        assert_eq!(s.rejection_reason(), Some("Print resolution too low"));
        assert!(s.reject("again", Utc::now()).is_err());
    }

    #[test]
    fn test_catalog_input_carries_submission_fields() {
        let s = submission();
        let input = s.catalog_input(10, vec!["M".into()], vec![]);
        assert_eq!(input.details.name, "Hand-block Shirt");
        assert_eq!(input.details.price, Decimal::new(1899, 0));
        assert!(input.validate().is_ok());
    }
}
