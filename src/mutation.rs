use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::*;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("{0}")]
    Validation(String),
    #[error("the '{}' action needs a base member", .0.as_str())]
    MissingBase(ActionKind),
    #[error("the self action cannot start from member '{0}'")]
    UnexpectedBase(String),
    #[error("member '{id}' already has a {link}")]
    AlreadyLinked { id: String, link: &'static str },
    #[error("'{0}' is not offered for this relative")]
    UnknownRelation(String),
    #[error("no add-relative form is open")]
    NotOpen,
    #[error("a submission is already in progress")]
    Busy,
    #[error("failed to save family member")]
    Persistence(#[source] anyhow::Error),
    #[error("member saved but the family list could not be refreshed")]
    Refetch(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberForm {
    pub name: String,
    pub gender: Gender,
    pub relation_type: String,
}

/// An open add-relative form and its resolved target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modal {
    pub target: RelativeTarget,
    pub form: MemberForm,
    pub error: Option<String>,
    /// Set once the create request succeeded; a retry resumes after it.
    pub created: Option<Member>,
}

impl Modal {
    pub fn title(&self) -> &'static str {
        self.target.kind.title()
    }

    /// Validates the form and builds the create request.
    pub fn payload(&self) -> Result<NewMember, MutationError> {
        let name = self.form.name.trim();
        if name.is_empty() {
            return Err(MutationError::Validation("name required".to_string()));
        }

        let kind = self.target.kind;
        let base = self.target.base.as_ref();
        let parent_id = match kind {
            ActionKind::Child => base.map(|base| base.id.clone()),
            ActionKind::Sibling => base.and_then(|base| base.parent_ref().map(str::to_string)),
            _ => None,
        };
        let sibling_of = match (kind, base) {
            (ActionKind::Sibling, Some(base)) if base.parent_ref().is_none() => {
                Some(base.id.clone())
            }
            _ => None,
        };
        let spouse_id = match (kind, base) {
            (ActionKind::Spouse, Some(base)) => Some(base.id.clone()),
            _ => None,
        };

        Ok(NewMember {
            name: name.to_string(),
            gender: self.form.gender,
            side: self.target.side,
            generation: self.target.generation,
            relation_type: self.form.relation_type.clone(),
            parent_id,
            sibling_of,
            spouse_id,
            birth_date: None,
            memo: None,
        })
    }

    /// The update the base member needs once the new member exists.
    fn back_patch(&self, created: &Member) -> Option<(String, MemberPatch)> {
        let base = self.target.base.as_ref()?;
        match self.target.kind {
            ActionKind::Parent => Some((base.id.clone(), MemberPatch::parent(&created.id))),
            ActionKind::Spouse => Some((base.id.clone(), MemberPatch::spouse(&created.id))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum FlowState {
    #[default]
    Idle,
    ModalOpen(Modal),
    Submitting(Modal),
}

/// The add-relative workflow: open a form, fill it, submit it once.
#[derive(Debug, Default)]
pub struct AddRelativeFlow {
    state: FlowState,
}

impl AddRelativeFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, FlowState::Idle)
    }

    pub fn modal(&self) -> Option<&Modal> {
        match &self.state {
            FlowState::ModalOpen(modal) | FlowState::Submitting(modal) => Some(modal),
            FlowState::Idle => None,
        }
    }

    /// Opens (or replaces) the form for `kind` relative to `base`.
    ///
    /// `entry` is only consulted for the self action, which has no base member.
    pub fn open(
        &mut self,
        kind: ActionKind,
        base: Option<&Member>,
        entry: Option<EntryPoint>,
    ) -> Result<(), MutationError> {
        if matches!(self.state, FlowState::Submitting(_)) {
            return Err(MutationError::Busy);
        }

        let target = resolve_target(kind, base, entry)?;
        let form = MemberForm {
            name: String::new(),
            gender: target.default_gender,
            relation_type: target
                .relation_options
                .first()
                .map(|label| label.to_string())
                .unwrap_or_default(),
        };
        self.state = FlowState::ModalOpen(Modal {
            target,
            form,
            error: None,
            created: None,
        });
        Ok(())
    }

    /// Closes the form without issuing any request.
    pub fn cancel(&mut self) -> Result<(), MutationError> {
        if matches!(self.state, FlowState::Submitting(_)) {
            return Err(MutationError::Busy);
        }
        self.state = FlowState::Idle;
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), MutationError> {
        self.editable()?.form.name = name.into();
        Ok(())
    }

    pub fn set_gender(&mut self, gender: Gender) -> Result<(), MutationError> {
        self.editable()?.form.gender = gender;
        Ok(())
    }

    pub fn set_relation(&mut self, relation: &str) -> Result<(), MutationError> {
        let modal = self.editable()?;
        let Some(label) = modal
            .target
            .relation_options
            .iter()
            .find(|option| **option == relation)
        else {
            return Err(MutationError::UnknownRelation(relation.to_string()));
        };
        modal.form.relation_type = label.to_string();
        Ok(())
    }

    /// Creates the member, back-patches the base member and refetches the collection.
    ///
    /// Steps run strictly in order and the first failure aborts the rest. The
    /// form stays open on validation, create and patch failures. Once the
    /// create succeeded, a retry only repeats the back-patch and the refetch.
    /// Dropping the returned future reopens the form.
    pub async fn submit<A>(&mut self, api: &A) -> Result<Vec<Member>, MutationError>
    where
        A: MemberApi + ?Sized,
    {
        let mut modal = match std::mem::take(&mut self.state) {
            FlowState::ModalOpen(modal) => modal,
            FlowState::Submitting(modal) => {
                self.state = FlowState::Submitting(modal);
                return Err(MutationError::Busy);
            }
            FlowState::Idle => return Err(MutationError::NotOpen),
        };

        let step = match modal.created.clone() {
            Some(created) => Step::Resume(created),
            None => match modal.payload() {
                Ok(payload) => Step::Create(payload),
                Err(err) => {
                    modal.error = Some(err.to_string());
                    self.state = FlowState::ModalOpen(modal);
                    return Err(err);
                }
            },
        };

        modal.error = None;
        let kind = modal.target.kind;
        let mut submission = Submission::begin(&mut self.state, modal);

        let created = match step {
            Step::Resume(created) => {
                info!(member = %created.id, "resuming add-relative after create");
                created
            }
            Step::Create(payload) => {
                info!(action = kind.as_str(), name = %payload.name, "adding family member");
                match api.create_member(&payload).await {
                    Ok(created) => {
                        submission.record_created(&created);
                        created
                    }
                    Err(err) => return Err(submission.fail(MutationError::Persistence(err))),
                }
            }
        };

        let patch = submission.back_patch(&created);
        if let Some((base_id, patch)) = patch {
            if let Err(err) = api.patch_member(&base_id, &patch).await {
                return Err(submission.fail(MutationError::Persistence(err)));
            }
        }

        submission.finish();
        match api.list_members().await {
            Ok(members) => {
                info!(member = %created.id, total = members.len(), "family member added");
                Ok(members)
            }
            Err(err) => {
                warn!(member = %created.id, error = %err, "refetch after create failed");
                Err(MutationError::Refetch(err))
            }
        }
    }

    fn editable(&mut self) -> Result<&mut Modal, MutationError> {
        match &mut self.state {
            FlowState::ModalOpen(modal) => Ok(modal),
            FlowState::Submitting(_) => Err(MutationError::Busy),
            FlowState::Idle => Err(MutationError::NotOpen),
        }
    }
}

enum Step {
    Create(NewMember),
    Resume(Member),
}

/// Holds the flow in `Submitting` and reopens the form if it is dropped there.
struct Submission<'f> {
    state: &'f mut FlowState,
}

impl<'f> Submission<'f> {
    fn begin(state: &'f mut FlowState, modal: Modal) -> Self {
        *state = FlowState::Submitting(modal);
        Self { state }
    }

    fn record_created(&mut self, created: &Member) {
        if let FlowState::Submitting(modal) = &mut *self.state {
            modal.created = Some(created.clone());
        }
    }

    fn back_patch(&self, created: &Member) -> Option<(String, MemberPatch)> {
        match &*self.state {
            FlowState::Submitting(modal) => modal.back_patch(created),
            _ => None,
        }
    }

    fn finish(&mut self) {
        *self.state = FlowState::Idle;
    }

    fn fail(&mut self, error: MutationError) -> MutationError {
        warn!(error = %error, "add-relative request failed");
        self.reopen(Some(error.to_string()));
        error
    }

    fn reopen(&mut self, message: Option<String>) {
        if let FlowState::Submitting(mut modal) = std::mem::take(&mut *self.state) {
            modal.error = message;
            *self.state = FlowState::ModalOpen(modal);
        }
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if matches!(*self.state, FlowState::Submitting(_)) {
            warn!("add-relative submission abandoned; reopening the form");
            self.reopen(None);
        }
    }
}
