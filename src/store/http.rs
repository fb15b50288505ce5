//! Envelope client over an HTTP-like transport

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use serde_with::{VecSkipError, serde_as};
use tracing::warn;

use super::{Error, RecordGameRequest, SessionStore, SetPlayersRequest};
use crate::{
    catalog::{Avatar, Game},
    session::Session,
};

/// A raw response from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// HTTP status text
    pub status_text: String,
    /// Response body
    pub body: String,
}

impl Response {
    /// A `200 OK` response with the given body
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_owned(),
            body: body.into(),
        }
    }
}

/// Sends JSON requests to the store
///
/// Implementations set `content-type: application/json` and resolve `path`
/// against the lobby's own origin.
pub trait Transport {
    /// Performs a `GET`
    ///
    /// # Errors
    ///
    /// Returns a description of the failure when no response arrived.
    fn get(&self, path: &str) -> Result<Response, String>;

    /// Performs a `POST`, with a JSON body when given
    ///
    /// # Errors
    ///
    /// Returns a description of the failure when no response arrived.
    fn post(&self, path: &str, body: Option<&Value>) -> Result<Response, String>;
}

/// [`super::SessionStore`] implementation speaking the `/api` envelope
#[derive(Debug, Clone)]
pub struct HttpStore<T> {
    transport: T,
}

#[serde_as]
#[derive(Deserialize)]
struct AvatarsBody {
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    avatars: Vec<Avatar>,
}

#[serde_as]
#[derive(Deserialize)]
struct GamesBody {
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    games: Vec<Game>,
}

#[derive(Deserialize)]
struct SessionBody {
    session: Session,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// Unwraps an `{ok, ...}` envelope
fn unwrap_envelope<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    match serde_json::from_str::<Value>(&response.body).ok() {
        Some(data) if data.get("ok").and_then(Value::as_bool) == Some(true) => {
            T::deserialize(&data).map_err(|e| Error::Malformed(e.to_string()))
        }
        data => {
            let error = data
                .as_ref()
                .and_then(|d| d.get("error"))
                .and_then(|e| ErrorBody::deserialize(e).ok());
            Err(match error {
                Some(ErrorBody {
                    message: Some(message),
                    code,
                }) if !message.is_empty() => Error::Rejected { code, message },
                _ => Error::Status {
                    status: response.status,
                    status_text: response.status_text,
                },
            })
        }
    }
}

impl<T: Transport> HttpStore<T> {
    /// Creates a store client over `transport`
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn get<B: DeserializeOwned>(&self, path: &str) -> Result<B, Error> {
        let response = self.transport.get(path).map_err(Error::Transport)?;
        unwrap_envelope(response).inspect_err(|e| warn!(path, error = %e, "store request failed"))
    }

    fn post<B: DeserializeOwned>(&self, path: &str, body: Option<&Value>) -> Result<B, Error> {
        let response = self.transport.post(path, body).map_err(Error::Transport)?;
        unwrap_envelope(response).inspect_err(|e| warn!(path, error = %e, "store request failed"))
    }

    fn post_json<R: serde::Serialize, B: DeserializeOwned>(
        &self,
        path: &str,
        request: &R,
    ) -> Result<B, Error> {
        let body = serde_json::to_value(request).map_err(|e| Error::Malformed(e.to_string()))?;
        self.post(path, Some(&body))
    }
}

impl<T: Transport> SessionStore for HttpStore<T> {
    fn avatars(&self) -> Result<Vec<Avatar>, Error> {
        self.get::<AvatarsBody>("/api/avatars").map(|b| b.avatars)
    }

    fn games(&self) -> Result<Vec<Game>, Error> {
        self.get::<GamesBody>("/api/games").map(|b| b.games)
    }

    fn session(&self) -> Result<Session, Error> {
        self.get::<SessionBody>("/api/session").map(|b| b.session)
    }

    fn set_players(&mut self, request: &SetPlayersRequest) -> Result<Session, Error> {
        self.post_json::<_, SessionBody>("/api/session/players", request)
            .map(|b| b.session)
    }

    fn record_game(&mut self, request: &RecordGameRequest) -> Result<Session, Error> {
        self.post_json::<_, SessionBody>("/api/session/record_game", request)
            .map(|b| b.session)
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.post::<Value>("/api/session/reset", None).map(|_| ())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{session::PlayerAssignment, slot::Slot};
    use serde_json::json;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    #[derive(Clone, Default)]
    struct MockTransport {
        responses: Arc<Mutex<VecDeque<Result<Response, String>>>>,
        requests: Arc<Mutex<Vec<(String, Option<Value>)>>>,
    }

    impl MockTransport {
        fn respond(&self, response: Result<Response, String>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn next(&self, path: &str, body: Option<&Value>) -> Result<Response, String> {
            self.requests
                .lock()
                .unwrap()
                .push((path.to_owned(), body.cloned()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("no response queued".to_owned()))
        }
    }

    impl Transport for MockTransport {
        fn get(&self, path: &str) -> Result<Response, String> {
            self.next(path, None)
        }

        fn post(&self, path: &str, body: Option<&Value>) -> Result<Response, String> {
            self.next(path, body)
        }
    }

    #[test]
    fn test_session_is_normalized() {
        let transport = MockTransport::default();
        transport.respond(Ok(Response::ok(
            json!({"ok": true, "session": {"playersBySlot": [{"slot": 1, "avatarId": "b"}]}})
                .to_string(),
        )));
        let store = HttpStore::new(transport.clone());

        let session = store.session().unwrap();
        assert_eq!(session.players_by_slot.len(), 4);
        assert_eq!(session.players_by_slot[1].avatar_id, "b");
        assert_eq!(transport.requests.lock().unwrap()[0].0, "/api/session");
    }

    #[test]
    fn test_rejected_envelope_uses_message() {
        let transport = MockTransport::default();
        transport.respond(Ok(Response {
            status: 400,
            status_text: "Bad Request".to_owned(),
            body: json!({"ok": false, "error": {"code": "unknown_avatar", "message": "unknown avatarId: x"}})
                .to_string(),
        }));
        let store = HttpStore::new(transport);

        assert_eq!(
            store.avatars(),
            Err(Error::Rejected {
                code: Some("unknown_avatar".to_owned()),
                message: "unknown avatarId: x".to_owned(),
            })
        );
    }

    #[test]
    fn test_non_json_falls_back_to_status() {
        let transport = MockTransport::default();
        transport.respond(Ok(Response {
            status: 502,
            status_text: "Bad Gateway".to_owned(),
            body: "<html>oops</html>".to_owned(),
        }));
        let store = HttpStore::new(transport);

        let err = store.games().unwrap_err();
        assert_eq!(err.to_string(), "502 Bad Gateway");
    }

    #[test]
    fn test_transport_failure() {
        let transport = MockTransport::default();
        transport.respond(Err("connection refused".to_owned()));
        let store = HttpStore::new(transport);

        assert_eq!(
            store.session(),
            Err(Error::Transport("connection refused".to_owned()))
        );
    }

    #[test]
    fn test_ok_without_session_is_malformed() {
        let transport = MockTransport::default();
        transport.respond(Ok(Response::ok(json!({"ok": true}).to_string())));
        let store = HttpStore::new(transport);

        assert!(matches!(store.session(), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_bad_catalog_entries_are_skipped() {
        let transport = MockTransport::default();
        transport.respond(Ok(Response::ok(
            json!({"ok": true, "games": [
                {"id": "pong", "filename": "pong.html", "maxDurationSec": 60},
                {"title": "no id"}
            ]})
            .to_string(),
        )));
        let store = HttpStore::new(transport);

        let games = store.games().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].max_duration_sec, 60);
    }

    #[test]
    fn test_set_players_payload() {
        let transport = MockTransport::default();
        transport.respond(Ok(Response::ok(
            json!({"ok": true, "session": {}}).to_string(),
        )));
        let mut store = HttpStore::new(transport.clone());

        let mut players = Session::default().assignments();
        players[2] = PlayerAssignment {
            slot: Slot::ALL[2],
            avatar_id: "av-1".to_owned(),
            gamepad_index: -1,
        };
        store
            .set_players(&SetPlayersRequest {
                players_by_slot: players,
            })
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        let (path, body) = &requests[0];
        assert_eq!(path, "/api/session/players");
        let body = body.as_ref().unwrap();
        assert_eq!(
            body["playersBySlot"][2],
            json!({"slot": 2, "avatarId": "av-1", "gamepadIndex": -1})
        );
    }

    #[test]
    fn test_reset_posts_without_body() {
        let transport = MockTransport::default();
        transport.respond(Ok(Response::ok(json!({"ok": true}).to_string())));
        let mut store = HttpStore::new(transport.clone());

        assert_eq!(store.reset(), Ok(()));
        assert_eq!(
            transport.requests.lock().unwrap()[0],
            ("/api/session/reset".to_owned(), None)
        );
    }
}
