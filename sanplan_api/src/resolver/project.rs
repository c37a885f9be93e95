use log::debug;

use crate::{
    config::{ProjectInfo, Revision},
    constants::DEFAULT_CHAP_PREFIX,
    document::NodeKind,
    error::{EntityKind, MalformedInputError, ReportError, SanplanError},
};

use super::{optional_text, parse_field, required_text, Resolver};

impl Resolver<'_> {
    /// Reads the project identity and the revision history.
    pub(super) fn resolve_project(&mut self) -> Result<(), SanplanError> {
        let doc = self.doc;
        let project = doc.first_child(self.root, NodeKind::Project).structured(
            MalformedInputError::MissingField {
                kind: EntityKind::Project,
                name: doc.tag(self.root).to_owned(),
                field: "project".into(),
            },
        )?;

        let field = |child, field| {
            required_text(doc, project, child, EntityKind::Project, "project", field)
                .map(str::to_owned)
        };
        self.graph.project = ProjectInfo {
            prefix: field(NodeKind::Prefix, "prefix")?,
            code: field(NodeKind::Code, "code")?,
            short_name: field(NodeKind::ShortName, "shortname")?,
            long_name: field(NodeKind::LongName, "longname")?,
        };
        debug!(
            "Resolving project '{}' ({})",
            self.graph.project.long_name, self.graph.project.short_name
        );

        for history in doc.children_of_kind(self.root, NodeKind::RevHistory) {
            for node in doc.children_of_kind(history, NodeKind::Revision) {
                let revision = self.resolve_revision(node, self.graph.revisions.len() + 1)?;
                self.graph.revisions.push(revision);
            }
        }

        self.graph.chap_prefix = self
            .defaults
            .global("iscsi_chap_prefix")
            .unwrap_or_else(|| DEFAULT_CHAP_PREFIX.to_owned());

        Ok(())
    }

    fn resolve_revision(
        &mut self,
        node: crate::document::NodeId,
        position: usize,
    ) -> Result<Revision, SanplanError> {
        let doc = self.doc;
        let name = format!("#{position}");
        let text = |child, field| {
            required_text(doc, node, child, EntityKind::Revision, &name, field)
        };

        let major = parse_field(
            text(NodeKind::MajorNumber, "majornumber")?,
            EntityKind::Revision,
            &name,
            "majornumber",
        )?;
        let minor = parse_field(
            text(NodeKind::MinorNumber, "minornumber")?,
            EntityKind::Revision,
            &name,
            "minornumber",
        )?;
        let revision = Revision {
            major,
            minor,
            date: text(NodeKind::Date, "date")?.to_owned(),
            author_initials: text(NodeKind::AuthorInitials, "authorinitials")?.to_owned(),
            remark: text(NodeKind::RevRemark, "revremark")?.to_owned(),
            reviewer: optional_text(doc, node, NodeKind::Reviewer),
            review_date: optional_text(doc, node, NodeKind::ReviewDate),
        };

        if revision.reviewer.is_none() {
            self.diagnostics
                .warn(format!("Revision {major}.{minor} has no reviewer"));
        }
        if revision.review_date.is_none() {
            self.diagnostics
                .warn(format!("Revision {major}.{minor} has no review date"));
        }
        Ok(revision)
    }
}
