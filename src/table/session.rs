use super::{
    allocator::AllocatedIdentifier,
    controller::Mutation,
    error::TableError,
    row::{Draft, FieldSpec, Row},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode {
    Create { hint: Option<AllocatedIdentifier> },
    /// Holds its own copy of the row as it was when the dialog opened.
    Edit { original: Row },
}

/// State of one open create/edit dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    id: u64,
    mode: EditMode,
    draft: Draft,
    submitting: bool,
    error: Option<TableError>,
}

impl EditSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> &EditMode {
        &self.mode
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn is_create(&self) -> bool {
        matches!(self.mode, EditMode::Create { .. })
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn error(&self) -> Option<&TableError> {
        self.error.as_ref()
    }

    pub fn hint(&self) -> Option<AllocatedIdentifier> {
        match &self.mode {
            EditMode::Create { hint } => *hint,
            EditMode::Edit { .. } => None,
        }
    }

    /// The id the dialog targets: the edited row, or the create hint.
    pub fn target_id(&self) -> Option<i64> {
        match &self.mode {
            EditMode::Create { hint } => hint.map(|hint| hint.value),
            EditMode::Edit { original } => Some(original.id),
        }
    }

    fn begin_submit(&mut self, fields: &[FieldSpec]) -> Result<Mutation, TableError> {
        if self.submitting {
            return Err(TableError::Busy("submission already in progress"));
        }
        let mutation = match &self.mode {
            EditMode::Create { hint } => self.draft.to_fields(fields).map(|fields| {
                Mutation::Insert {
                    hint: *hint,
                    fields,
                }
            }),
            EditMode::Edit { original } => {
                self.draft
                    .to_patch(fields, original)
                    .map(|patch| Mutation::Update {
                        id: original.id,
                        patch,
                    })
            }
        };
        match mutation {
            Ok(mutation) => {
                self.submitting = true;
                self.error = None;
                Ok(mutation)
            }
            Err(err) => {
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }
}

/// Owns at most one [`EditSession`]. Results addressed to a session that
/// has since been closed or replaced are ignored.
#[derive(Debug, Clone)]
pub struct EditDialog {
    fields: Vec<FieldSpec>,
    session: Option<EditSession>,
    session_seq: u64,
}

impl EditDialog {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            session: None,
            session_seq: 0,
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    fn is_submitting(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.submitting)
    }

    /// Opens an empty create dialog and returns its session id, which the
    /// identifier proposal must be tagged with. Refused mid-submission.
    pub fn open_create(&mut self) -> Option<u64> {
        let draft = Draft::empty(&self.fields);
        self.open(EditMode::Create { hint: None }, draft)
    }

    /// Opens an edit dialog seeded from `row`.
    pub fn open_edit(&mut self, row: &Row) -> Option<u64> {
        let draft = Draft::from_row(&self.fields, row);
        self.open(
            EditMode::Edit {
                original: row.clone(),
            },
            draft,
        )
    }

    fn open(&mut self, mode: EditMode, draft: Draft) -> Option<u64> {
        if self.is_submitting() {
            return None;
        }
        self.session_seq += 1;
        self.session = Some(EditSession {
            id: self.session_seq,
            mode,
            draft,
            submitting: false,
            error: None,
        });
        Some(self.session_seq)
    }

    /// Discards the draft. Returns false while a submission is in flight,
    /// in which case the dialog stays open.
    pub fn close(&mut self) -> bool {
        if self.is_submitting() {
            return false;
        }
        self.session = None;
        true
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.submitting || !self.fields.iter().any(|field| field.name == name) {
            return false;
        }
        session.draft.set(name, value);
        true
    }

    pub fn apply_hint(
        &mut self,
        session_id: u64,
        result: Result<AllocatedIdentifier, TableError>,
    ) -> bool {
        let Some(session) = self.session.as_mut().filter(|s| s.id == session_id) else {
            return false;
        };
        let EditMode::Create { hint } = &mut session.mode else {
            return false;
        };
        match result {
            Ok(proposed) => *hint = Some(proposed),
            // A missing hint is proposed again on submit.
            Err(err) => tracing::warn!(session_id, error = %err, "identifier proposal failed"),
        }
        true
    }

    /// Validates the draft and marks the session as submitting. Validation
    /// failures stay on the session and never reach the network.
    pub fn submit(&mut self) -> Result<(u64, Mutation), TableError> {
        let Some(session) = self.session.as_mut() else {
            return Err(TableError::Busy("dialog is closed"));
        };
        let mutation = session.begin_submit(&self.fields)?;
        Ok((session.id, mutation))
    }

    /// Routes a submission result back. Success closes the dialog; failure
    /// keeps it open with the error shown. Returns false for results that
    /// belong to another session.
    pub fn finish_submit(
        &mut self,
        session_id: u64,
        result: Result<(), TableError>,
    ) -> bool {
        let Some(session) = self.session.as_mut().filter(|s| s.id == session_id) else {
            tracing::debug!(session_id, "Dropping result for closed dialog");
            return false;
        };
        match result {
            Ok(()) => self.session = None,
            Err(err) => {
                session.submitting = false;
                session.error = Some(err);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::row::Scalar;

    fn dialog() -> EditDialog {
        EditDialog::new(vec![
            FieldSpec::text("name", "Name"),
            FieldSpec::text("country", "Country"),
        ])
    }

    fn lotus() -> Row {
        Row::new(3).with("name", "Lotus").with("country", "UK")
    }

    #[test]
    fn create_starts_blank_and_takes_hint() {
        let mut dialog = dialog();
        let id = dialog.open_create().unwrap();
        let session = dialog.session().unwrap();
        assert!(session.is_create());
        assert_eq!(session.draft().get("name"), "");
        assert_eq!(session.target_id(), None);

        assert!(dialog.apply_hint(id, Ok(AllocatedIdentifier::new(8))));
        assert_eq!(dialog.session().unwrap().target_id(), Some(8));
    }

    #[test]
    fn hint_for_replaced_session_is_dropped() {
        let mut dialog = dialog();
        let stale = dialog.open_create().unwrap();
        dialog.close();
        dialog.open_create().unwrap();
        assert!(!dialog.apply_hint(stale, Ok(AllocatedIdentifier::new(8))));
        assert_eq!(dialog.session().unwrap().hint(), None);
    }

    #[test]
    fn validation_error_keeps_dialog_open() {
        let mut dialog = dialog();
        dialog.open_create();
        dialog.set_field("name", "Ariel");
        let err = dialog.submit().unwrap_err();
        assert_eq!(err, TableError::Validation("Country is required".to_string()));
        let session = dialog.session().unwrap();
        assert!(!session.is_submitting());
        assert_eq!(session.error(), Some(&err));
    }

    #[test]
    fn double_submit_is_refused() {
        let mut dialog = dialog();
        dialog.open_edit(&lotus());
        dialog.set_field("country", "England");
        let (_, mutation) = dialog.submit().unwrap();
        assert!(matches!(mutation, Mutation::Update { id: 3, .. }));
        assert!(matches!(dialog.submit(), Err(TableError::Busy(_))));
        assert!(!dialog.close(), "cannot close mid-submission");
        assert!(!dialog.set_field("name", "Caterham"));
    }

    #[test]
    fn failed_submit_resets_flag_and_shows_error() {
        let mut dialog = dialog();
        let id = dialog.open_edit(&lotus()).unwrap();
        dialog.submit().unwrap();
        let err = TableError::Transport("timeout".to_string());
        assert!(dialog.finish_submit(id, Err(err.clone())));
        let session = dialog.session().unwrap();
        assert!(!session.is_submitting());
        assert_eq!(session.error(), Some(&err));
    }

    #[test]
    fn successful_submit_closes() {
        let mut dialog = dialog();
        let id = dialog.open_create().unwrap();
        dialog.set_field("name", "Ariel");
        dialog.set_field("country", "UK");
        let (_, mutation) = dialog.submit().unwrap();
        match mutation {
            Mutation::Insert { fields, .. } => {
                assert_eq!(fields.get("country"), Some(&Scalar::from("UK")));
            }
            other => panic!("unexpected mutation {other:?}"),
        }
        assert!(dialog.finish_submit(id, Ok(())));
        assert!(!dialog.is_open());
    }

    #[test]
    fn reopening_discards_unsaved_draft() {
        let mut dialog = dialog();
        let row = lotus();
        dialog.open_edit(&row);
        dialog.set_field("name", "Not Lotus");
        assert!(dialog.close());
        dialog.open_edit(&row);
        assert_eq!(dialog.session().unwrap().draft().get("name"), "Lotus");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut dialog = dialog();
        dialog.open_create();
        assert!(!dialog.set_field("id", "99"));
    }
}
