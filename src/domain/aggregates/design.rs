//! Design Aggregate
//!
//! Designs are either shop templates (no owner) or a customer's custom
//! layout. The payload is a list of positioned text, image and shape
//! elements on a square canvas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::text_enum;

pub const CANVAS_SIZE: f32 = 2000.0;
pub const MAX_ELEMENTS: usize = 50;

text_enum! {
    pub enum DesignKind { Template => "template", Custom => "custom" }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignPayload {
    #[serde(default)]
    pub background: Option<String>,
    pub elements: Vec<DesignElement>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesignElement {
    Text {
        content: String,
        font: String,
        font_size: f32,
        color: String,
        #[serde(flatten)]
        frame: Frame,
    },
    Image {
        url: String,
        #[serde(flatten)]
        frame: Frame,
    },
    Shape {
        shape: ShapeKind,
        fill: String,
        #[serde(flatten)]
        frame: Frame,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind { Rectangle, Circle, Triangle, Line }

/// Position and size of an element in canvas pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub rotation: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DesignError {
    #[error("a design may hold at most 50 elements")]
    TooManyElements,
    #[error("element {index}: {problem}")]
    InvalidElement { index: usize, problem: &'static str },
    #[error("invalid background color")]
    InvalidBackground,
    #[error("design name must be 1 to 120 characters")]
    InvalidName,
    #[error("templates cannot be edited")]
    TemplateReadOnly,
    #[error("design is linked to a product")]
    Linked,
}

impl DesignPayload {
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.elements.len() > MAX_ELEMENTS { return Err(DesignError::TooManyElements); }
        if let Some(bg) = &self.background {
            if !is_hex_color(bg) { return Err(DesignError::InvalidBackground); }
        }
        for (index, element) in self.elements.iter().enumerate() {
            element.validate().map_err(|problem| DesignError::InvalidElement { index, problem })?;
        }
        Ok(())
    }
}

impl DesignElement {
    fn frame(&self) -> &Frame {
        match self {
            Self::Text { frame, .. } | Self::Image { frame, .. } | Self::Shape { frame, .. } => frame,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        let f = self.frame();
        let on_canvas = |v: f32| v.is_finite() && (0.0..=CANVAS_SIZE).contains(&v);
        if !(on_canvas(f.x) && on_canvas(f.y) && on_canvas(f.width) && on_canvas(f.height)) {
            return Err("outside the canvas");
        }
        if !f.rotation.is_finite() { return Err("invalid rotation"); }
        match self {
            Self::Text { content, font, font_size, color, .. } => {
                if content.trim().is_empty() { return Err("text is empty"); }
                if content.chars().count() > 200 { return Err("text is too long"); }
                if font.trim().is_empty() { return Err("font is missing"); }
                if !(6.0..=400.0).contains(font_size) { return Err("font size out of range"); }
                if !is_hex_color(color) { return Err("invalid color"); }
            }
            Self::Image { url, .. } => {
                if !(url.starts_with("https://") || url.starts_with("/uploads/")) { return Err("image must be an uploaded URL"); }
            }
            Self::Shape { fill, .. } => {
                if !is_hex_color(fill) { return Err("invalid fill"); }
            }
        }
        Ok(())
    }
}

/// `#rrggbb`
pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7 && value.starts_with('#') && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Design {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub kind: DesignKind,
    pub payload: Json<DesignPayload>,
    pub product_id: Option<Uuid>,
    pub preview_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Design {
    pub fn custom(user_id: Uuid, name: &str, payload: DesignPayload, now: DateTime<Utc>) -> Result<Self, DesignError> {
        let name = checked_name(name)?;
        payload.validate()?;
        Ok(Self {
            id: Uuid::now_v7(), user_id: Some(user_id), name, kind: DesignKind::Custom,
            payload: Json(payload), product_id: None, preview_url: None, created_at: now, updated_at: now,
        })
    }

    /// Copies a template into a custom design owned by `user_id`.
    pub fn from_template(template: &Design, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), user_id: Some(user_id), name: template.name.clone(), kind: DesignKind::Custom,
            payload: template.payload.clone(), product_id: None, preview_url: template.preview_url.clone(),
            created_at: now, updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == Some(user_id) }

    /// Edits are refused once the design is attached to a submission, so a
    /// reviewed payload stays the one that was reviewed.
    pub fn update(&mut self, name: Option<&str>, payload: Option<DesignPayload>, now: DateTime<Utc>) -> Result<(), DesignError> {
        if self.kind == DesignKind::Template { return Err(DesignError::TemplateReadOnly); }
        if self.product_id.is_some() { return Err(DesignError::Linked); }
        if let Some(name) = name { self.name = checked_name(name)?; }
        if let Some(payload) = payload {
            payload.validate()?;
            self.payload = Json(payload);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Attaches the design to a submission. Linking again to the same
    /// submission is allowed; taking it from another one is not.
    pub fn link_to(&mut self, submission_id: Uuid, now: DateTime<Utc>) -> Result<(), DesignError> {
        if self.kind == DesignKind::Template { return Err(DesignError::TemplateReadOnly); }
        match self.product_id {
            Some(current) if current != submission_id => Err(DesignError::Linked),
            _ => {
                self.product_id = Some(submission_id);
                self.updated_at = now;
                Ok(())
            }
        }
    }

    pub fn ensure_deletable(&self) -> Result<(), DesignError> {
        if self.kind == DesignKind::Template { return Err(DesignError::TemplateReadOnly); }
        if self.product_id.is_some() { return Err(DesignError::Linked); }
        Ok(())
    }
}

fn checked_name(name: &str) -> Result<String, DesignError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 120 { return Err(DesignError::InvalidName); }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(x: f32) -> DesignElement {
        DesignElement::Text {
            content: "AM".into(), font: "Playfair".into(), font_size: 48.0, color: "#1a1a1a".into(),
            frame: Frame { x, y: 100.0, ..Frame::default() },
        }
    }

    #[test]
    fn test_payload_json_shape() {
        let json = serde_json::json!({
            "elements": [
                {"type": "text", "content": "Monogram", "font": "Inter", "font_size": 32, "color": "#ffffff", "x": 10, "y": 20},
                {"type": "shape", "shape": "circle", "fill": "#c0ffee", "x": 0, "y": 0, "width": 50, "height": 50}
            ]
        });
        let payload: DesignPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.elements.len(), 2);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_payload_validation() {
        let off_canvas = DesignPayload { background: None, elements: vec![text(10.0), text(2500.0)] };
        assert_eq!(off_canvas.validate(), Err(DesignError::InvalidElement { index: 1, problem: "outside the canvas" }));

        let too_many = DesignPayload { background: None, elements: vec![text(1.0); MAX_ELEMENTS + 1] };
        assert_eq!(too_many.validate(), Err(DesignError::TooManyElements));

        let bad_bg = DesignPayload { background: Some("navy".into()), elements: vec![] };
        assert_eq!(bad_bg.validate(), Err(DesignError::InvalidBackground));

        let image = DesignPayload {
            background: None,
            elements: vec![DesignElement::Image { url: "http://evil.example/x.png".into(), frame: Frame::default() }],
        };
        assert!(image.validate().is_err());
    }

    #[test]
    fn test_template_copy_and_edit_rules() {
        let now = Utc::now();
        let template = Design {
            id: Uuid::new_v4(), user_id: None, name: "Crest".into(), kind: DesignKind::Template,
            payload: Json(DesignPayload { background: None, elements: vec![text(5.0)] }),
            product_id: None, preview_url: None, created_at: now, updated_at: now,
        };
        let mut t = template.clone();
        assert_eq!(t.update(Some("Mine"), None, now), Err(DesignError::TemplateReadOnly));

        let user = Uuid::new_v4();
        let mut copy = Design::from_template(&template, user, now);
        assert!(copy.is_owned_by(user));
        assert_eq!(copy.kind, DesignKind::Custom);
        copy.update(Some(" Wedding crest "), None, now).unwrap();
        assert_eq!(copy.name, "Wedding crest");

        copy.product_id = Some(Uuid::new_v4());
        assert_eq!(copy.ensure_deletable(), Err(DesignError::Linked));
    }

    #[test]
    fn test_linked_design_is_frozen() {
        let now = Utc::now();
        let mut design = Design::custom(Uuid::new_v4(), "Monogram", DesignPayload::default(), now).unwrap();
        design.link_to(Uuid::new_v4(), now).unwrap();

        let replacement = DesignPayload { background: Some("#000000".into()), elements: vec![text(1.0)] };
        assert_eq!(design.update(Some("x"), Some(replacement), now), Err(DesignError::Linked));
        assert_eq!(design.update(Some("Renamed"), None, now), Err(DesignError::Linked));
        assert!(design.payload.0.elements.is_empty());
        assert_eq!(design.name, "Monogram");
    }

    #[test]
    fn test_link_cannot_be_taken_over() {
        let now = Utc::now();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let mut design = Design::custom(Uuid::new_v4(), "Crest", DesignPayload::default(), now).unwrap();
        design.link_to(first, now).unwrap();
        design.link_to(first, now).unwrap();
        assert_eq!(design.link_to(second, now), Err(DesignError::Linked));
        assert_eq!(design.product_id, Some(first));
    }
}
