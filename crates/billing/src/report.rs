use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use construcbill_core::{DomainError, DomainResult, uuid_newtype};

use crate::line_item::LineItemId;

uuid_newtype!(pub struct ImageId, "ImageId");
uuid_newtype!(pub struct SectionId, "SectionId");

/// A photo attached to a report, stored inline as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReportImage {
    pub id: ImageId,
    pub data_url: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub linked_line_item_id: Option<LineItemId>,
}

/// A work category with its own progress figures and gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub id: SectionId,
    pub section_name: String,
    #[serde(default)]
    pub planned_quantity: Option<Decimal>,
    #[serde(default)]
    pub completed_quantity: Option<Decimal>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub images: Vec<StatusReportImage>,
    #[serde(default)]
    pub sort_order: u32,
}

impl ReportSection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: SectionId::new(),
            section_name: name.into(),
            planned_quantity: None,
            completed_quantity: None,
            unit: String::new(),
            images: Vec::new(),
            sort_order: 0,
        }
    }
}

/// Where an image goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "sectionId", rename_all = "camelCase")]
pub enum GalleryTarget {
    /// The flat gallery of a narrative report.
    Report,
    Section(SectionId),
}

/// The narrative half of a billing package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StatusReport {
    #[serde(rename_all = "camelCase")]
    Narrative {
        #[serde(default)]
        summary_text: String,
        #[serde(default)]
        progress_text: String,
        #[serde(default)]
        risks_text: String,
        #[serde(default)]
        images: Vec<StatusReportImage>,
    },
    #[serde(rename_all = "camelCase")]
    Sectioned {
        #[serde(default)]
        sections: Vec<ReportSection>,
    },
}

impl Default for StatusReport {
    fn default() -> Self {
        StatusReport::Narrative {
            summary_text: String::new(),
            progress_text: String::new(),
            risks_text: String::new(),
            images: Vec::new(),
        }
    }
}

impl StatusReport {
    pub fn sectioned() -> Self {
        StatusReport::Sectioned { sections: Vec::new() }
    }

    /// Sections in display order.
    pub fn sections(&self) -> Vec<&ReportSection> {
        match self {
            StatusReport::Narrative { .. } => Vec::new(),
            StatusReport::Sectioned { sections } => {
                let mut ordered: Vec<&ReportSection> = sections.iter().collect();
                ordered.sort_by_key(|s| s.sort_order);
                ordered
            }
        }
    }

    pub fn image_count(&self) -> usize {
        match self {
            StatusReport::Narrative { images, .. } => images.len(),
            StatusReport::Sectioned { sections } => sections.iter().map(|s| s.images.len()).sum(),
        }
    }

    pub fn contains_image(&self, id: ImageId) -> bool {
        match self {
            StatusReport::Narrative { images, .. } => images.iter().any(|i| i.id == id),
            StatusReport::Sectioned { sections } => sections
                .iter()
                .any(|s| s.images.iter().any(|i| i.id == id)),
        }
    }

    /// Check that `add_image` would succeed, without mutating.
    pub fn check_image_target(&self, target: GalleryTarget) -> DomainResult<()> {
        match (self, target) {
            (StatusReport::Narrative { .. }, GalleryTarget::Report) => Ok(()),
            (StatusReport::Sectioned { sections }, GalleryTarget::Section(id)) => {
                if sections.iter().any(|s| s.id == id) {
                    Ok(())
                } else {
                    Err(DomainError::not_found())
                }
            }
            (StatusReport::Narrative { .. }, GalleryTarget::Section(_)) => Err(
                DomainError::validation("a narrative report has no sections"),
            ),
            (StatusReport::Sectioned { .. }, GalleryTarget::Report) => Err(
                DomainError::validation("a sectioned report stores images per section"),
            ),
        }
    }

    /// Append to the end of the target gallery.
    pub fn add_image(&mut self, target: GalleryTarget, image: StatusReportImage) -> DomainResult<()> {
        self.check_image_target(target)?;
        match (self, target) {
            (StatusReport::Narrative { images, .. }, GalleryTarget::Report) => images.push(image),
            (StatusReport::Sectioned { sections }, GalleryTarget::Section(id)) => {
                if let Some(section) = sections.iter_mut().find(|s| s.id == id) {
                    section.images.push(image);
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn remove_image(&mut self, id: ImageId) -> DomainResult<StatusReportImage> {
        let gallery = match self {
            StatusReport::Narrative { images, .. } => Some(images),
            StatusReport::Sectioned { sections } => sections
                .iter_mut()
                .map(|s| &mut s.images)
                .find(|images| images.iter().any(|i| i.id == id)),
        };
        let gallery = gallery.ok_or_else(DomainError::not_found)?;
        let pos = gallery
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(DomainError::not_found)?;
        Ok(gallery.remove(pos))
    }

    /// Add a section after the current last one, renumbering display order
    /// from zero.
    pub fn add_section(&mut self, mut section: ReportSection) -> DomainResult<()> {
        match self {
            StatusReport::Narrative { .. } => Err(DomainError::validation(
                "sections can only be added to a sectioned report",
            )),
            StatusReport::Sectioned { sections } => {
                if sections.iter().any(|s| s.id == section.id) {
                    return Err(DomainError::conflict(format!(
                        "section {} already exists",
                        section.id
                    )));
                }
                let next = u32::try_from(sections.len())
                    .map_err(|_| DomainError::validation("too many report sections"))?;
                // Client-supplied orders can be sparse or huge; compact them first.
                sections.sort_by_key(|s| s.sort_order);
                for (pos, existing) in sections.iter_mut().enumerate() {
                    existing.sort_order = pos as u32;
                }
                section.sort_order = next;
                sections.push(section);
                Ok(())
            }
        }
    }

    pub fn remove_section(&mut self, id: SectionId) -> DomainResult<ReportSection> {
        match self {
            StatusReport::Sectioned { sections } => {
                let pos = sections
                    .iter()
                    .position(|s| s.id == id)
                    .ok_or_else(DomainError::not_found)?;
                Ok(sections.remove(pos))
            }
            StatusReport::Narrative { .. } => Err(DomainError::not_found()),
        }
    }

    /// Check that `order` is a permutation of the current sections.
    pub fn check_section_order(&self, order: &[SectionId]) -> DomainResult<()> {
        let sections = match self {
            StatusReport::Sectioned { sections } => sections,
            StatusReport::Narrative { .. } => {
                return Err(DomainError::validation("a narrative report has no sections"));
            }
        };
        let mut given: Vec<SectionId> = order.to_vec();
        given.sort();
        given.dedup();
        let mut current: Vec<SectionId> = sections.iter().map(|s| s.id).collect();
        current.sort();
        if given.len() != order.len() || given != current {
            return Err(DomainError::validation(
                "section order must list every section exactly once",
            ));
        }
        Ok(())
    }

    /// Assign `sort_order` by position in `order`.
    pub fn reorder_sections(&mut self, order: &[SectionId]) -> DomainResult<()> {
        self.check_section_order(order)?;
        if let StatusReport::Sectioned { sections } = self {
            for section in sections.iter_mut() {
                if let Some(pos) = order.iter().position(|id| *id == section.id) {
                    section.sort_order = pos as u32;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(caption: &str) -> StatusReportImage {
        StatusReportImage {
            id: ImageId::new(),
            data_url: "data:image/png;base64,iVBORw0KGgo=".to_string(),
            caption: caption.to_string(),
            linked_line_item_id: None,
        }
    }

    #[test]
    fn narrative_gallery_keeps_insertion_order() {
        let mut report = StatusReport::default();
        let first = image("north face");
        let second = image("slab pour");
        report.add_image(GalleryTarget::Report, first.clone()).unwrap();
        report.add_image(GalleryTarget::Report, second.clone()).unwrap();

        match &report {
            StatusReport::Narrative { images, .. } => {
                assert_eq!(images, &vec![first.clone(), second]);
            }
            other => panic!("unexpected report {other:?}"),
        }

        report.remove_image(first.id).unwrap();
        assert_eq!(report.image_count(), 1);
        assert_eq!(report.remove_image(first.id), Err(DomainError::NotFound));
    }

    #[test]
    fn section_images_go_to_their_section() {
        let mut report = StatusReport::sectioned();
        let steel = ReportSection::named("Steel erection");
        let steel_id = steel.id;
        report.add_section(steel).unwrap();
        report.add_section(ReportSection::named("MEP rough-in")).unwrap();

        report
            .add_image(GalleryTarget::Section(steel_id), image("column grid"))
            .unwrap();

        assert_eq!(report.sections()[0].images.len(), 1);
        assert!(matches!(
            report.add_image(GalleryTarget::Report, image("x")),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(
            report.add_image(GalleryTarget::Section(SectionId::new()), image("x")),
            Err(DomainError::NotFound)
        );
    }

    #[test]
    fn adding_after_a_maximal_sort_order_renumbers_instead_of_overflowing() {
        let mut top = ReportSection::named("Roofing");
        top.sort_order = u32::MAX;
        let mut first = ReportSection::named("Excavation");
        first.sort_order = 7;
        let mut report = StatusReport::Sectioned {
            sections: vec![top, first],
        };

        report.add_section(ReportSection::named("Handover")).unwrap();

        let ordered: Vec<_> = report
            .sections()
            .iter()
            .map(|s| (s.section_name.as_str(), s.sort_order))
            .collect();
        assert_eq!(
            ordered,
            vec![("Excavation", 0), ("Roofing", 1), ("Handover", 2)]
        );
    }

    #[test]
    fn reorder_requires_a_permutation() {
        let mut report = StatusReport::sectioned();
        let a = ReportSection::named("A");
        let b = ReportSection::named("B");
        let (a_id, b_id) = (a.id, b.id);
        report.add_section(a).unwrap();
        report.add_section(b).unwrap();

        report.reorder_sections(&[b_id, a_id]).unwrap();
        let names: Vec<_> = report.sections().iter().map(|s| s.section_name.clone()).collect();
        assert_eq!(names, vec!["B", "A"]);

        assert!(report.reorder_sections(&[b_id]).is_err());
        assert!(report.reorder_sections(&[b_id, b_id]).is_err());
    }

    #[test]
    fn report_kind_is_tagged_on_the_wire() {
        let json = serde_json::to_value(StatusReport::default()).unwrap();
        assert_eq!(json["kind"], "narrative");
        assert_eq!(json["summaryText"], "");
    }
}
