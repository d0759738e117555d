//! MCP server exposing calendar and people tools over stdio
//!
//! Tool handlers return `Result<String, String>`: success text or a
//! user-facing error, folded into tool-call content at the protocol edge.
//! When authentication has not completed yet, handlers answer with sign-in
//! instructions as ordinary content so the caller can retry.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Utc, Weekday};
use log::info;
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::tool::schema_for_type,
    model::{
        CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
    },
    schemars::{self, JsonSchema},
    service::{RequestContext, RoleServer},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{stdin, stdout};

use crate::context::{GraphContext, GraphSession};
use crate::graph::EventQuery;
use crate::graph::models::{
    Attendee, DateTimeTimeZone, DateTimeTimeZonePatch, EmailAddress, Event, EventPatch, ItemBody,
    Location,
};

const DEFAULT_TIME_ZONE: &str = "GMT Standard Time";
const DEFAULT_LIST_LIMIT: u32 = 10;
const PEOPLE_SEARCH_LIMIT: u32 = 5;

#[derive(Clone)]
pub struct OutlookMcpServer {
    context: Arc<GraphContext>,
}

impl OutlookMcpServer {
    pub fn new(context: Arc<GraphContext>) -> Self {
        Self { context }
    }

    /// Run the MCP server over stdio transport.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting Outlook MCP server");
        let server = self.serve((stdin(), stdout())).await?;
        info!("MCP server initialized, waiting for requests");
        server.waiting().await?;
        Ok(())
    }

    /// The Graph session, or rendered sign-in instructions when
    /// authentication is still pending or has failed.
    async fn session_or_prompt(&self) -> Result<Arc<GraphSession>, String> {
        self.context.session().await.map_err(|failure| failure.render())
    }

    async fn handle_find_person(&self, params: FindPersonParams) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        let matches = session
            .graph
            .search_people(&session.user_email, &params.name, PEOPLE_SEARCH_LIMIT)
            .await
            .map_err(|e| format!("Failed to search for people: {}", e))?;

        if matches.is_empty() {
            return Ok(format!("No people found matching '{}'.", params.name));
        }

        let mut text = format!("Found {} people matching '{}':\n", matches.len(), params.name);
        for person in matches {
            match person.email {
                Some(email) => text.push_str(&format!("\n- {} <{}>", person.display_name, email)),
                None => text.push_str(&format!("\n- {} (no email address)", person.display_name)),
            }
        }
        Ok(text)
    }

    async fn handle_create_event(&self, params: CreateEventParams) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        let event = build_event(&params, &[]);
        let created = session
            .graph
            .create_event(&session.user_email, &event)
            .await
            .map_err(|e| format!("Failed to create event: {}", e))?;

        Ok(format!("✅ Event created successfully!\n\n{}", render_event(&created)))
    }

    async fn handle_create_event_with_attendees(
        &self,
        params: CreateEventWithAttendeesParams,
    ) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        let event = build_event(&params.event, &params.attendees);
        let created = session
            .graph
            .create_event(&session.user_email, &event)
            .await
            .map_err(|e| format!("Failed to create event: {}", e))?;

        let count = created.attendees.as_ref().map_or(0, Vec::len);
        Ok(format!(
            "✅ Event created successfully with {} attendee(s)!\n\n{}",
            count,
            render_event(&created)
        ))
    }

    async fn handle_get_event(&self, params: GetEventParams) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        let event = session
            .graph
            .get_event(&session.user_email, &params.event_id)
            .await
            .map_err(|e| format!("Failed to get event: {}", e))?;

        Ok(render_event(&event))
    }

    async fn handle_list_events(&self, params: ListEventsParams) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        let query = EventQuery {
            subject_contains: params.subject,
            start_after: params.start,
            end_before: params.end,
            top: Some(params.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        };
        let events = session
            .graph
            .list_events(&session.user_email, &query)
            .await
            .map_err(|e| format!("Failed to list events: {}", e))?;

        if events.is_empty() {
            return Ok("No events found.".to_string());
        }

        let mut text = format!("Found {} event(s):\n", events.len());
        for event in &events {
            text.push_str(&format!(
                "\n- {} | {} | ID: {}",
                event.subject.as_deref().unwrap_or("(no subject)"),
                event
                    .start
                    .as_ref()
                    .map(|s| s.date_time.as_str())
                    .unwrap_or("(no start)"),
                event.id.as_deref().unwrap_or("(unknown)")
            ));
        }
        Ok(text)
    }

    async fn handle_update_event(&self, params: UpdateEventParams) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        // Requested attendees merge with the event's current list; an
        // update never silently uninvites anyone.
        let attendees = match &params.attendees {
            Some(inputs) if !inputs.is_empty() => {
                let current = session
                    .graph
                    .get_event(&session.user_email, &params.event_id)
                    .await
                    .map_err(|e| format!("Failed to get event: {}", e))?;
                Some(merge_attendees(
                    current.attendees.unwrap_or_default(),
                    inputs,
                    &[],
                ))
            }
            _ => None,
        };

        let patch = update_patch(&params, attendees);
        let updated = session
            .graph
            .update_event(&session.user_email, &params.event_id, &patch)
            .await
            .map_err(|e| format!("Failed to update event: {}", e))?;

        Ok(format!("✅ Event updated successfully!\n\n{}", render_event(&updated)))
    }

    async fn handle_update_event_attendees(
        &self,
        params: UpdateEventAttendeesParams,
    ) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        let current = session
            .graph
            .get_event(&session.user_email, &params.event_id)
            .await
            .map_err(|e| format!("Failed to get event: {}", e))?;

        let attendees = merge_attendees(
            current.attendees.unwrap_or_default(),
            &params.add_attendees.unwrap_or_default(),
            &params.remove_attendees.unwrap_or_default(),
        );
        let count = attendees.len();

        let patch = EventPatch {
            attendees: Some(attendees),
            ..Default::default()
        };
        let updated = session
            .graph
            .update_event(&session.user_email, &params.event_id, &patch)
            .await
            .map_err(|e| format!("Failed to update event attendees: {}", e))?;

        Ok(format!(
            "✅ Event attendees updated, now {} attendee(s).\n\n{}",
            count,
            render_event(&updated)
        ))
    }

    async fn handle_delete_event(&self, params: GetEventParams) -> Result<String, String> {
        let session = match self.session_or_prompt().await {
            Ok(session) => session,
            Err(prompt) => return Ok(prompt),
        };

        // Fetch first so a bad id reports "not found" rather than a blind
        // delete failure, and the confirmation can name the event.
        let event = session
            .graph
            .get_event(&session.user_email, &params.event_id)
            .await
            .map_err(|e| format!("Failed to get event: {}", e))?;

        session
            .graph
            .delete_event(&session.user_email, &params.event_id)
            .await
            .map_err(|e| format!("Failed to delete event: {}", e))?;

        Ok(format!(
            "🗑️ Event '{}' deleted.",
            event.subject.as_deref().unwrap_or(&params.event_id)
        ))
    }

    async fn handle_auth_status(&self) -> Result<String, String> {
        // The prompt slot lives on the context, so a device-code handshake
        // published while the first initialization is still polling is
        // visible here even though no session exists yet.
        let prompt = self.context.device_code_prompt();

        let Some(session) = self.context.try_session() else {
            if let Some(info) = prompt.info() {
                return Ok(format!("Sign-in in progress:\n{}", info.message));
            }
            return Ok(
                "Authentication has not started yet. Call any tool to begin sign-in.".to_string(),
            );
        };

        let status = session.auth.token_status().await;
        let mut text = serde_json::to_string_pretty(&status)
            .map_err(|e| format!("Failed to render token status: {}", e))?;

        if prompt.is_authenticating() {
            if let Some(info) = prompt.info() {
                text.push_str("\n\nSign-in in progress:\n");
                text.push_str(&info.message);
            }
        }
        Ok(text)
    }
}

/// Assemble a create payload, filling in the defaults: next business day
/// noon to one o'clock, and the submission timestamp appended to the body.
fn build_event(params: &CreateEventParams, attendees: &[AttendeeInput]) -> Event {
    let time_zone = params
        .time_zone
        .clone()
        .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());

    let (default_start, default_end) = next_business_day_slot(Utc::now().naive_utc());
    let start = params.start.clone().unwrap_or(default_start);
    let end = params.end.clone().unwrap_or(default_end);

    Event {
        subject: Some(params.subject.clone()),
        body: Some(stamped_body(&params.body, "Request submitted")),
        start: Some(DateTimeTimeZone {
            date_time: start,
            time_zone: time_zone.clone(),
        }),
        end: Some(DateTimeTimeZone {
            date_time: end,
            time_zone,
        }),
        location: params
            .location
            .clone()
            .map(|name| Location { display_name: name }),
        attendees: (!attendees.is_empty()).then(|| dedupe_attendees(attendees)),
        ..Default::default()
    }
}

/// Assemble an update payload. Only fields the caller provided are set, and
/// an absent time zone leaves the event's current zone in place.
fn update_patch(params: &UpdateEventParams, attendees: Option<Vec<Attendee>>) -> EventPatch {
    EventPatch {
        subject: params.subject.clone(),
        body: params.body.as_deref().map(|b| stamped_body(b, "Updated")),
        start: params.start.clone().map(|date_time| DateTimeTimeZonePatch {
            date_time,
            time_zone: params.time_zone.clone(),
        }),
        end: params.end.clone().map(|date_time| DateTimeTimeZonePatch {
            date_time,
            time_zone: params.time_zone.clone(),
        }),
        location: params
            .location
            .clone()
            .map(|name| Location { display_name: name }),
        attendees,
    }
}

/// HTML body with the audit stamp appended, e.g.
/// "...<br/>Request submitted around 29-Aug-2026 14:05".
fn stamped_body(content: &str, verb: &str) -> ItemBody {
    ItemBody {
        content_type: "HTML".to_string(),
        content: format!(
            "{}<br/>{} around {}",
            content,
            verb,
            Utc::now().format("%d-%b-%Y %H:%M")
        ),
    }
}

/// Noon to 13:00 on the next weekday after `now`.
fn next_business_day_slot(now: NaiveDateTime) -> (String, String) {
    let mut day = now.date() + Duration::days(1);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day += Duration::days(1);
    }
    let start = day.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    let end = day.and_time(NaiveTime::from_hms_opt(13, 0, 0).unwrap());
    (
        start.format("%Y-%m-%dT%H:%M:%S").to_string(),
        end.format("%Y-%m-%dT%H:%M:%S").to_string(),
    )
}

fn attendee_from_input(input: &AttendeeInput) -> Attendee {
    Attendee {
        email_address: EmailAddress {
            address: input.email.clone(),
            name: Some(input.name.clone().unwrap_or_else(|| input.email.clone())),
        },
        attendee_type: input
            .attendee_type
            .clone()
            .unwrap_or_else(|| "required".to_string()),
    }
}

/// Deduplicate attendee emails case-insensitively, keeping first spelling.
fn dedupe_attendees(inputs: &[AttendeeInput]) -> Vec<Attendee> {
    let mut seen = std::collections::HashSet::new();
    inputs
        .iter()
        .filter(|input| seen.insert(input.email.to_lowercase()))
        .map(attendee_from_input)
        .collect()
}

/// Apply additions and removals to an attendee list. Comparison is by
/// lowercased email; existing entries keep their original spelling and type.
fn merge_attendees(
    existing: Vec<Attendee>,
    add: &[AttendeeInput],
    remove: &[String],
) -> Vec<Attendee> {
    let removals: std::collections::HashSet<String> =
        remove.iter().map(|e| e.to_lowercase()).collect();

    let mut seen = std::collections::HashSet::new();
    let mut result: Vec<Attendee> = existing
        .into_iter()
        .filter(|a| {
            let key = a.email_address.address.to_lowercase();
            !removals.contains(&key) && seen.insert(key)
        })
        .collect();

    for input in add {
        let key = input.email.to_lowercase();
        if !removals.contains(&key) && seen.insert(key) {
            result.push(attendee_from_input(input));
        }
    }
    result
}

fn render_event(event: &Event) -> String {
    let mut text = format!(
        "Subject: {}",
        event.subject.as_deref().unwrap_or("(no subject)")
    );
    if let Some(start) = &event.start {
        text.push_str(&format!("\nStart: {} ({})", start.date_time, start.time_zone));
    }
    if let Some(end) = &event.end {
        text.push_str(&format!("\nEnd: {} ({})", end.date_time, end.time_zone));
    }
    if let Some(location) = &event.location {
        text.push_str(&format!("\nLocation: {}", location.display_name));
    }
    if let Some(attendees) = &event.attendees {
        if !attendees.is_empty() {
            let list: Vec<&str> = attendees
                .iter()
                .map(|a| a.email_address.address.as_str())
                .collect();
            text.push_str(&format!("\nAttendees: {}", list.join(", ")));
        }
    }
    if let Some(id) = &event.id {
        text.push_str(&format!("\nEvent ID: {}", id));
    }
    if let Some(link) = &event.web_link {
        text.push_str(&format!("\nWeb link: {}", link));
    }
    text
}

// ============================================================================
// Tool Parameter Types
// ============================================================================

/// Empty parameters (for tools with no parameters)
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EmptyParams {}

/// Parameters for the find-person tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindPersonParams {
    /// Name (or name fragment) of the person to look up
    pub name: String,
}

/// An attendee reference accepted by the event tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AttendeeInput {
    /// Email address of the attendee
    pub email: String,
    /// Display name; defaults to the email address
    #[serde(default)]
    pub name: Option<String>,
    /// "required" or "optional"; defaults to required
    #[serde(default, rename = "type")]
    pub attendee_type: Option<String>,
}

/// Parameters for the create-event tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateEventParams {
    /// Subject line of the event
    pub subject: String,
    /// Body text; rendered as HTML with a submission timestamp appended
    pub body: String,
    /// Start time as ISO 8601 local time, e.g. 2026-09-01T12:00:00.
    /// Defaults to noon on the next business day.
    #[serde(default)]
    pub start: Option<String>,
    /// End time as ISO 8601 local time. Defaults to one hour after the
    /// default start.
    #[serde(default)]
    pub end: Option<String>,
    /// Windows time zone name for start and end, e.g. "GMT Standard Time"
    #[serde(default)]
    pub time_zone: Option<String>,
    /// Location display name
    #[serde(default)]
    pub location: Option<String>,
}

/// Parameters for the create-event-with-attendees tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateEventWithAttendeesParams {
    #[serde(flatten)]
    pub event: CreateEventParams,
    /// Attendees to invite; duplicate email addresses are ignored
    pub attendees: Vec<AttendeeInput>,
}

/// Parameters for tools addressing a single event
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetEventParams {
    /// Graph event id
    pub event_id: String,
}

/// Parameters for the list-events tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListEventsParams {
    /// Only events whose subject contains this text
    #[serde(default)]
    pub subject: Option<String>,
    /// Only events starting at or after this ISO 8601 time
    #[serde(default)]
    pub start: Option<String>,
    /// Only events ending at or before this ISO 8601 time
    #[serde(default)]
    pub end: Option<String>,
    /// Maximum number of events to return (default 10)
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Parameters for the update-event tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateEventParams {
    /// Graph event id
    pub event_id: String,
    /// New subject line
    #[serde(default)]
    pub subject: Option<String>,
    /// New start time as ISO 8601 local time
    #[serde(default)]
    pub start: Option<String>,
    /// New end time as ISO 8601 local time
    #[serde(default)]
    pub end: Option<String>,
    /// Windows time zone name for start and end; leave unset to keep the
    /// event's current zone
    #[serde(default)]
    pub time_zone: Option<String>,
    /// New location display name
    #[serde(default)]
    pub location: Option<String>,
    /// New body text; rendered as HTML with an update timestamp appended
    #[serde(default)]
    pub body: Option<String>,
    /// Attendees to add; merged with the event's existing attendee list
    #[serde(default)]
    pub attendees: Option<Vec<AttendeeInput>>,
}

/// Parameters for the update-event-attendees tool
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateEventAttendeesParams {
    /// Graph event id
    pub event_id: String,
    /// Attendees to add
    #[serde(default)]
    pub add_attendees: Option<Vec<AttendeeInput>>,
    /// Email addresses to remove
    #[serde(default)]
    pub remove_attendees: Option<Vec<String>>,
}

impl ServerHandler for OutlookMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "outlook-mcp".to_string(),
                title: Some("Outlook Calendar MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Outlook MCP Server - Manage Microsoft 365 calendar events and look up people. \
                Use find-person to resolve names to email addresses, create-event and \
                create-event-with-attendees to schedule meetings, get-event/list-events to read \
                the calendar, update-event and update-event-attendees to change events, \
                delete-event to cancel, and auth-status to inspect authentication."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = vec![
            Tool::new(
                "find-person",
                "Find a person in the organization by name. Returns matching display names and email addresses for use as event attendees.",
                schema_for_type::<FindPersonParams>(),
            ),
            Tool::new(
                "create-event",
                "Create a calendar event. Start and end default to noon-1pm on the next business day.",
                schema_for_type::<CreateEventParams>(),
            ),
            Tool::new(
                "create-event-with-attendees",
                "Create a calendar event and invite attendees by email address.",
                schema_for_type::<CreateEventWithAttendeesParams>(),
            ),
            Tool::new(
                "get-event",
                "Get the details of a calendar event by its id.",
                schema_for_type::<GetEventParams>(),
            ),
            Tool::new(
                "list-events",
                "List calendar events, optionally filtered by subject text and time range.",
                schema_for_type::<ListEventsParams>(),
            ),
            Tool::new(
                "update-event",
                "Update fields of an existing calendar event. Only the provided fields change.",
                schema_for_type::<UpdateEventParams>(),
            ),
            Tool::new(
                "update-event-attendees",
                "Add or remove attendees on an existing calendar event.",
                schema_for_type::<UpdateEventAttendeesParams>(),
            ),
            Tool::new(
                "delete-event",
                "Delete a calendar event by its id.",
                schema_for_type::<GetEventParams>(),
            ),
            Tool::new(
                "auth-status",
                "Show the current authentication mode and token status, including any pending device-code sign-in.",
                schema_for_type::<EmptyParams>(),
            ),
        ];
        Ok(ListToolsResult {
            meta: None,
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let result = match request.name.as_ref() {
            "find-person" => {
                let params: FindPersonParams = parse_params(request.arguments)?;
                self.handle_find_person(params).await
            }
            "create-event" => {
                let params: CreateEventParams = parse_params(request.arguments)?;
                self.handle_create_event(params).await
            }
            "create-event-with-attendees" => {
                let params: CreateEventWithAttendeesParams = parse_params(request.arguments)?;
                self.handle_create_event_with_attendees(params).await
            }
            "get-event" => {
                let params: GetEventParams = parse_params(request.arguments)?;
                self.handle_get_event(params).await
            }
            "list-events" => {
                let params: ListEventsParams = parse_params(request.arguments)?;
                self.handle_list_events(params).await
            }
            "update-event" => {
                let params: UpdateEventParams = parse_params(request.arguments)?;
                self.handle_update_event(params).await
            }
            "update-event-attendees" => {
                let params: UpdateEventAttendeesParams = parse_params(request.arguments)?;
                self.handle_update_event_attendees(params).await
            }
            "delete-event" => {
                let params: GetEventParams = parse_params(request.arguments)?;
                self.handle_delete_event(params).await
            }
            "auth-status" => self.handle_auth_status().await,
            other => Err(format!("Unknown tool: {}", other)),
        };

        match result {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(error) => Ok(CallToolResult::error(vec![Content::text(error)])),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    arguments: Option<serde_json::Map<String, Value>>,
) -> Result<T, McpError> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| McpError::invalid_params(format!("Invalid parameters: {}", e), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use chrono::NaiveDate;

    fn create_test_server() -> OutlookMcpServer {
        let config = AuthConfig {
            mode: Some("client_provided_token".to_string()),
            user_email: Some("user@contoso.com".to_string()),
            ..Default::default()
        };
        OutlookMcpServer::new(Arc::new(GraphContext::with_config(config)))
    }

    #[test]
    fn test_next_business_day_skips_weekends() {
        // Friday 2026-08-28 -> Monday 2026-08-31
        let friday = NaiveDate::from_ymd_opt(2026, 8, 28)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let (start, end) = next_business_day_slot(friday);
        assert_eq!(start, "2026-08-31T12:00:00");
        assert_eq!(end, "2026-08-31T13:00:00");

        // Tuesday -> Wednesday
        let tuesday = NaiveDate::from_ymd_opt(2026, 8, 25)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let (start, _) = next_business_day_slot(tuesday);
        assert_eq!(start, "2026-08-26T12:00:00");
    }

    fn input(email: &str) -> AttendeeInput {
        AttendeeInput {
            email: email.to_string(),
            name: None,
            attendee_type: None,
        }
    }

    #[test]
    fn test_attendee_input_defaults() {
        let attendee = attendee_from_input(&input("ada@contoso.com"));
        assert_eq!(attendee.email_address.address, "ada@contoso.com");
        assert_eq!(attendee.email_address.name.as_deref(), Some("ada@contoso.com"));
        assert_eq!(attendee.attendee_type, "required");

        let attendee = attendee_from_input(&AttendeeInput {
            email: "grace@contoso.com".to_string(),
            name: Some("Grace Hopper".to_string()),
            attendee_type: Some("optional".to_string()),
        });
        assert_eq!(attendee.email_address.name.as_deref(), Some("Grace Hopper"));
        assert_eq!(attendee.attendee_type, "optional");
    }

    #[test]
    fn test_dedupe_attendees_is_case_insensitive() {
        let attendees = dedupe_attendees(&[
            input("Ada@contoso.com"),
            input("ada@contoso.com"),
            input("grace@contoso.com"),
        ]);
        assert_eq!(attendees.len(), 2);
        assert_eq!(attendees[0].email_address.address, "Ada@contoso.com");
    }

    #[test]
    fn test_merge_attendees_adds_and_removes() {
        let existing = vec![
            Attendee::required("ada@contoso.com"),
            Attendee::required("grace@contoso.com"),
        ];
        let merged = merge_attendees(
            existing,
            &[input("Grace@contoso.com"), input("alan@contoso.com")],
            &["ADA@contoso.com".to_string()],
        );
        let emails: Vec<&str> = merged
            .iter()
            .map(|a| a.email_address.address.as_str())
            .collect();
        assert_eq!(emails, vec!["grace@contoso.com", "alan@contoso.com"]);
    }

    #[test]
    fn test_build_event_applies_defaults() {
        let params = CreateEventParams {
            subject: "Budget review".to_string(),
            body: "Quarterly numbers".to_string(),
            start: None,
            end: None,
            time_zone: None,
            location: None,
        };
        let event = build_event(&params, &[]);

        assert_eq!(event.subject.as_deref(), Some("Budget review"));
        let start = event.start.unwrap();
        assert_eq!(start.time_zone, DEFAULT_TIME_ZONE);
        assert!(start.date_time.ends_with("T12:00:00"));
        assert!(event.end.unwrap().date_time.ends_with("T13:00:00"));

        let body = event.body.unwrap();
        assert_eq!(body.content_type, "HTML");
        assert!(
            body.content
                .starts_with("Quarterly numbers<br/>Request submitted around ")
        );
        assert!(event.attendees.is_none());
    }

    #[test]
    fn test_update_patch_merges_attendees_and_stamps_body() {
        let params = UpdateEventParams {
            event_id: "AAA".to_string(),
            subject: None,
            start: Some("2026-09-02T09:00:00".to_string()),
            end: None,
            time_zone: None,
            location: None,
            body: Some("Moved earlier".to_string()),
            attendees: Some(vec![input("Ada@contoso.com"), input("alan@contoso.com")]),
        };

        // The handler merges requested attendees into the event's current
        // list before building the patch; nobody already invited drops off.
        let current = vec![
            Attendee::required("ada@contoso.com"),
            Attendee::required("grace@contoso.com"),
        ];
        let merged = merge_attendees(current, params.attendees.as_ref().unwrap(), &[]);
        let patch = update_patch(&params, Some(merged));

        let emails: Vec<&str> = patch
            .attendees
            .as_ref()
            .unwrap()
            .iter()
            .map(|a| a.email_address.address.as_str())
            .collect();
        assert_eq!(
            emails,
            vec!["ada@contoso.com", "grace@contoso.com", "alan@contoso.com"]
        );

        let body = patch.body.unwrap();
        assert!(body.content.starts_with("Moved earlier<br/>Updated around "));

        // An unset zone is left off the patch so the event keeps its own.
        assert!(patch.start.unwrap().time_zone.is_none());
        assert!(patch.subject.is_none());
    }

    #[test]
    fn test_render_event_includes_all_present_fields() {
        let event = Event {
            id: Some("AAA".to_string()),
            subject: Some("Standup".to_string()),
            start: Some(DateTimeTimeZone {
                date_time: "2026-09-01T12:00:00".to_string(),
                time_zone: "GMT Standard Time".to_string(),
            }),
            attendees: Some(vec![Attendee::required("ada@contoso.com")]),
            web_link: Some("https://outlook.office.com/x".to_string()),
            ..Default::default()
        };
        let text = render_event(&event);
        assert!(text.contains("Subject: Standup"));
        assert!(text.contains("Start: 2026-09-01T12:00:00 (GMT Standard Time)"));
        assert!(text.contains("Attendees: ada@contoso.com"));
        assert!(text.contains("Event ID: AAA"));
        assert!(text.contains("Web link: https://outlook.office.com/x"));
    }

    #[tokio::test]
    async fn test_graph_call_without_token_reports_expired_credential() {
        // Provided-token mode with no token: the session comes up but every
        // Graph call fails locally at token acquisition.
        let server = create_test_server();
        let result = server
            .handle_get_event(GetEventParams {
                event_id: "AAA".to_string(),
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.contains("not available or has expired"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_auth_status_before_first_call() {
        let server = create_test_server();
        let text = server.handle_auth_status().await.unwrap();
        assert!(text.contains("not started"));
    }

    #[tokio::test]
    async fn test_auth_status_surfaces_prompt_during_first_sign_in() {
        let server = create_test_server();

        // A handshake is in flight before any session has been cached.
        server.context.device_code_prompt().publish(
            crate::auth::credentials::DeviceCodeInfo {
                user_code: "ABCD-1234".to_string(),
                verification_uri: "https://microsoft.com/devicelogin".to_string(),
                message: "To sign in, open the page and enter the code ABCD-1234.".to_string(),
                expires_on: chrono::Utc::now() + chrono::Duration::minutes(15),
            },
        );
        assert!(server.context.try_session().is_none());

        let text = server.handle_auth_status().await.unwrap();
        assert!(text.contains("Sign-in in progress"));
        assert!(text.contains("ABCD-1234"));
    }

    #[tokio::test]
    async fn test_auth_status_after_session_established() {
        let server = create_test_server();
        server.context.session().await.unwrap();

        let text = server.handle_auth_status().await.unwrap();
        assert!(text.contains("client_provided_token"));
        assert!(text.contains("\"is_expired\": true"));
    }
}
