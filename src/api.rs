use std::collections::HashSet;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::*;

/// Body of a member-create request. Absent links are sent as explicit nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub gender: Gender,
    pub side: Side,
    pub generation: i32,
    pub relation_type: String,
    pub parent_id: Option<String>,
    pub sibling_of: Option<String>,
    pub spouse_id: Option<String>,
    pub birth_date: Option<String>,
    pub memo: Option<String>,
}

/// Partial update; only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spouse_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sibling_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl MemberPatch {
    pub fn parent(id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn spouse(id: impl Into<String>) -> Self {
        Self {
            spouse_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, member: &mut Member) {
        if let Some(name) = &self.name {
            member.name = name.clone();
        }
        if let Some(gender) = self.gender {
            member.gender = gender;
        }
        if let Some(side) = self.side {
            member.side = side;
        }
        if let Some(relation) = &self.relation_type {
            member.relation_type = relation.clone();
        }
        if let Some(generation) = self.generation {
            member.generation = generation;
        }
        if let Some(parent_id) = &self.parent_id {
            member.parent_id = Some(parent_id.clone());
        }
        if let Some(spouse_id) = &self.spouse_id {
            member.spouse_id = Some(spouse_id.clone());
        }
        if let Some(sibling_of) = &self.sibling_of {
            member.sibling_of = Some(sibling_of.clone());
        }
        if let Some(birth_date) = &self.birth_date {
            member.birth_date = Some(birth_date.clone());
        }
        if let Some(memo) = &self.memo {
            member.memo = Some(memo.clone());
        }
    }
}

impl NewMember {
    pub fn into_member(self, id: String) -> Member {
        Member {
            id,
            name: self.name,
            gender: self.gender,
            side: self.side,
            relation_type: self.relation_type,
            generation: self.generation,
            parent_id: self.parent_id,
            spouse_id: self.spouse_id,
            sibling_of: self.sibling_of,
            birth_date: self.birth_date,
            memo: self.memo,
        }
    }
}

/// The member endpoints of the household backend.
#[async_trait]
pub trait MemberApi: Send + Sync {
    async fn list_members(&self) -> Result<Vec<Member>>;
    async fn create_member(&self, member: &NewMember) -> Result<Member>;
    async fn patch_member(&self, id: &str, patch: &MemberPatch) -> Result<Member>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    List,
    Create,
    Patch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    List,
    Create { name: String },
    Patch { id: String, patch: MemberPatch },
}

impl ApiRequest {
    pub fn operation(&self) -> ApiOperation {
        match self {
            ApiRequest::List => ApiOperation::List,
            ApiRequest::Create { .. } => ApiOperation::Create,
            ApiRequest::Patch { .. } => ApiOperation::Patch,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    members: Vec<Member>,
    next_id: u64,
    requests: Vec<ApiRequest>,
    failures: HashSet<ApiOperation>,
}

/// In-process member store with the backend's create/patch semantics.
#[derive(Debug, Default)]
pub struct MemoryMemberApi {
    state: RwLock<MemoryState>,
}

impl MemoryMemberApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(members: Vec<Member>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                members,
                ..MemoryState::default()
            }),
        }
    }

    pub async fn members(&self) -> Vec<Member> {
        self.state.read().await.members.clone()
    }

    pub async fn requests(&self) -> Vec<ApiRequest> {
        self.state.read().await.requests.clone()
    }

    /// Makes the next call of `operation` fail once.
    pub async fn fail_next(&self, operation: ApiOperation) {
        self.state.write().await.failures.insert(operation);
    }
}

impl MemoryState {
    fn record(&mut self, request: ApiRequest) -> Result<()> {
        let operation = request.operation();
        self.requests.push(request);
        if self.failures.remove(&operation) {
            bail!("{operation:?} request rejected by the member store");
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let candidate = format!("m{}", self.next_id);
            if !self.members.iter().any(|member| member.id == candidate) {
                return candidate;
            }
        }
    }
}

#[async_trait]
impl MemberApi for MemoryMemberApi {
    async fn list_members(&self) -> Result<Vec<Member>> {
        let mut state = self.state.write().await;
        state.record(ApiRequest::List)?;
        Ok(state.members.clone())
    }

    async fn create_member(&self, member: &NewMember) -> Result<Member> {
        let mut state = self.state.write().await;
        state.record(ApiRequest::Create {
            name: member.name.clone(),
        })?;

        let id = state.allocate_id();
        let created = member.clone().into_member(id);

        if let Some(spouse_id) = created.spouse_ref() {
            if let Some(spouse) = state.members.iter_mut().find(|m| m.id == spouse_id) {
                if spouse.spouse_ref().is_none() {
                    spouse.spouse_id = Some(created.id.clone());
                }
            }
        }

        debug!(member = %created.id, "member stored");
        state.members.push(created.clone());
        Ok(created)
    }

    async fn patch_member(&self, id: &str, patch: &MemberPatch) -> Result<Member> {
        let mut state = self.state.write().await;
        state.record(ApiRequest::Patch {
            id: id.to_string(),
            patch: patch.clone(),
        })?;

        let member = state
            .members
            .iter_mut()
            .find(|member| member.id == id)
            .ok_or_else(|| anyhow!("family member '{id}' not found"))?;
        patch.apply(member);
        Ok(member.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::member;
    use pretty_assertions::assert_eq;

    fn draft(name: &str) -> NewMember {
        NewMember {
            name: name.to_string(),
            gender: Gender::Female,
            side: Side::Wife,
            generation: 0,
            relation_type: "self".to_string(),
            parent_id: None,
            sibling_of: None,
            spouse_id: None,
            birth_date: None,
            memo: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_fresh_ids_and_links_the_spouse_back() {
        let api = MemoryMemberApi::with_members(vec![
            member("m1", Side::Husband, 0, "self"),
            member("m2", Side::Husband, 1, "father"),
        ]);
        let mut request = draft("Yuna");
        request.spouse_id = Some("m1".to_string());

        let created = api.create_member(&request).await.unwrap();
        assert_eq!(created.id, "m3");

        let members = api.members().await;
        let husband = members.iter().find(|m| m.id == "m1").unwrap();
        assert_eq!(husband.spouse_id.as_deref(), Some("m3"));
    }

    #[tokio::test]
    async fn create_keeps_an_existing_spouse_link() {
        let mut taken = member("m1", Side::Husband, 0, "self");
        taken.spouse_id = Some("other".to_string());
        let api = MemoryMemberApi::with_members(vec![taken]);
        let mut request = draft("Second");
        request.spouse_id = Some("m1".to_string());

        api.create_member(&request).await.unwrap();

        let members = api.members().await;
        assert_eq!(members[0].spouse_id.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn patch_only_touches_present_fields() {
        let api = MemoryMemberApi::with_members(vec![member("m1", Side::Husband, 0, "self")]);

        let patched = api
            .patch_member("m1", &MemberPatch::parent("m9"))
            .await
            .unwrap();
        assert_eq!(patched.parent_id.as_deref(), Some("m9"));
        assert_eq!(patched.relation_type, "self");

        let missing = api.patch_member("nope", &MemberPatch::spouse("m1")).await;
        assert!(missing.unwrap_err().to_string().contains("'nope' not found"));
    }

    #[tokio::test]
    async fn injected_failures_fire_once_and_are_recorded() {
        let api = MemoryMemberApi::new();
        api.fail_next(ApiOperation::List).await;

        assert!(api.list_members().await.is_err());
        assert!(api.list_members().await.unwrap().is_empty());
        assert_eq!(api.requests().await, vec![ApiRequest::List, ApiRequest::List]);
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let json = serde_json::to_value(MemberPatch::spouse("m4")).unwrap();
        assert_eq!(json, serde_json::json!({ "spouse_id": "m4" }));
        assert!(MemberPatch::default().is_empty());
    }

    #[test]
    fn new_member_sends_explicit_nulls() {
        let json = serde_json::to_value(draft("Yuna")).unwrap();
        assert_eq!(json["parent_id"], serde_json::Value::Null);
        assert_eq!(json["side"], "wife");
        assert_eq!(json["gender"], "female");
    }

    #[test]
    fn member_wire_format_uses_document_ids() {
        let raw = r#"{"_id":"65f0","name":"Kim","gender":"male","side":"husband","relation_type":"본인","generation":0,"parent_id":null}"#;
        let parsed: Member = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.id, "65f0");
        assert!(parsed.is_self_label());
        assert!(parsed.parent_id.is_none());

        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["_id"], "65f0");
        assert!(json.get("spouse_id").is_none());
    }
}
