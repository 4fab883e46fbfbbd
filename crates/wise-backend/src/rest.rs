use async_trait::async_trait;
use reqwest::Method;
use uuid::Uuid;

use wise_core::StoreError;
use wise_core::store::{ConsultationQuery, RemoteStore, SortOrder};
use wise_types::models::{
    Consultation, ConsultationInsert, ConsultationPatch, ExpertResponse, ExpertResponseInsert,
    Profile,
};
use wise_types::session::Session;

use crate::{BackendClient, send_json};

const CONSULTATIONS: &str = "/rest/v1/consultations";
const EXPERT_RESPONSES: &str = "/rest/v1/expert_responses";
const PROFILES: &str = "/rest/v1/profiles";

const RETURN_REPRESENTATION: (&str, &str) = ("Prefer", "return=representation");

fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

/// `in.("a","b")`
fn one_of<T: ToString>(values: &[T]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.to_string()))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn query_params(query: &ConsultationQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", "*".to_string())];
    if let Some(user_id) = query.user_id {
        params.push(("user_id", eq(user_id)));
    }
    if let Some(expert_id) = query.expert_id {
        params.push(("expert_id", eq(expert_id)));
    }
    if let Some(status) = query.status {
        params.push(("status", eq(status)));
    }
    let order = match query.order {
        SortOrder::NewestCreated => "created_at.desc",
        SortOrder::NewestUpdated => "updated_at.desc",
    };
    params.push(("order", order.to_string()));
    params
}

#[async_trait]
impl RemoteStore for BackendClient {
    async fn insert_consultations(
        &self,
        session: &Session,
        rows: &[ConsultationInsert],
    ) -> Result<Vec<Consultation>, StoreError> {
        let request = self
            .authed(Method::POST, CONSULTATIONS, session)?
            .header(RETURN_REPRESENTATION.0, RETURN_REPRESENTATION.1)
            .json(rows);
        send_json(request).await
    }

    async fn find_consultations(
        &self,
        session: &Session,
        query: &ConsultationQuery,
    ) -> Result<Vec<Consultation>, StoreError> {
        let request = self
            .request(Method::GET, CONSULTATIONS, Some(session))
            .query(&query_params(query));
        send_json(request).await
    }

    async fn get_consultation(
        &self,
        session: &Session,
        id: &str,
    ) -> Result<Option<Consultation>, StoreError> {
        // The id column is a uuid; anything else cannot match a row.
        if id.parse::<Uuid>().is_err() {
            return Ok(None);
        }
        let request = self
            .request(Method::GET, CONSULTATIONS, Some(session))
            .query(&[("select", "*".to_string()), ("id", eq(id))]);
        let rows: Vec<Consultation> = send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_consultation(
        &self,
        session: &Session,
        id: &str,
        patch: &ConsultationPatch,
    ) -> Result<Option<Consultation>, StoreError> {
        let request = self
            .authed(Method::PATCH, CONSULTATIONS, session)?
            .query(&[("id", eq(id))])
            .header(RETURN_REPRESENTATION.0, RETURN_REPRESENTATION.1)
            .json(patch);
        let rows: Vec<Consultation> = send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_expert_response(
        &self,
        session: &Session,
        row: &ExpertResponseInsert,
    ) -> Result<ExpertResponse, StoreError> {
        let request = self
            .authed(Method::POST, EXPERT_RESPONSES, session)?
            .header(RETURN_REPRESENTATION.0, RETURN_REPRESENTATION.1)
            .json(&[row]);
        let rows: Vec<ExpertResponse> = send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".into()))
    }

    async fn expert_responses(
        &self,
        session: &Session,
        consultation_ids: &[String],
    ) -> Result<Vec<ExpertResponse>, StoreError> {
        if consultation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request(Method::GET, EXPERT_RESPONSES, Some(session))
            .query(&[
                ("select", "*".to_string()),
                ("consultation_id", one_of(consultation_ids)),
                ("order", "created_at.asc".to_string()),
            ]);
        send_json(request).await
    }

    async fn profiles(&self, session: &Session, ids: &[Uuid]) -> Result<Vec<Profile>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request(Method::GET, PROFILES, Some(session))
            .query(&[
                ("select", "id,username,email,created_at,updated_at".to_string()),
                ("id", one_of(ids)),
            ]);
        send_json(request).await
    }
}
