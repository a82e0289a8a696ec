//! WHOIS-backed identity resolution.
//!
//! A nickname is transient; authorization wants something durable. The
//! resolver turns a nick into an [`AuthContext`] by issuing a WHOIS query,
//! accumulating the scattered numeric replies into a [`WhoisResponse`],
//! and matching the assembled response against the configured people. The
//! result is cached with a TTL and evicted when the nick leaves (PART,
//! QUIT, or KICK), since the binding is only trustworthy while the user is
//! present.
//!
//! Resolution is deferred: `request` runs its continuation immediately on a
//! cache hit, otherwise queues it and issues at most one outstanding WHOIS
//! per nick. Inbound chat is re-published on `auth_message_in` with the
//! resolved context attached, so downstream plugins never touch WHOIS.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use stray_proto::{irc_eq, Kick, Message, Nick, Part, Privmsg, Quit, Reply};
use tracing::{debug, warn};

use crate::bus::{channels, Bus, Payload};
use crate::cache::TtlCache;
use crate::config::ConfigView;
use crate::error::PluginError;
use crate::plugin::{Plugin, PluginContext};

const IDENTITY: &str = "core.identity";
const DEFAULT_CACHE_TTL_SECS: i64 = 300;
const DEFAULT_WHOIS_TIMEOUT_SECS: i64 = 30;

/// The resolved identity attached to authenticated traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// Durable person id; `None` means "not identified".
    pub uuid: Option<String>,
    /// Authorization groups the person belongs to.
    pub groups: Vec<String>,
}

impl AuthContext {
    /// The unidentified context.
    pub fn anonymous() -> Self {
        AuthContext::default()
    }

    /// True when a durable identity was resolved.
    pub fn is_identified(&self) -> bool {
        self.uuid.is_some()
    }

    /// True when the context carries `group`.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// WHOIS fields assembled across several numeric replies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhoisResponse {
    pub user: Option<String>,
    pub host: Option<String>,
    pub real_name: Option<String>,
    pub server: Option<String>,
    pub server_info: Option<String>,
    pub away: Option<String>,
    /// Set by any of the network-specific "identified to services" replies.
    pub nick_identified: bool,
}

/// One way a configured person can prove who they are.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    /// The nick is identified to services and equals `nick`.
    Nickserv { nick: String },
    /// A bridge/relay user, matched on hostname plus real name.
    Bridge { host: String, real_name: String },
}

impl AuthMethod {
    fn matches(&self, nick: &Nick, whois: &WhoisResponse) -> bool {
        match self {
            AuthMethod::Nickserv { nick: expected } => {
                whois.nick_identified && irc_eq(nick.as_str(), expected)
            }
            AuthMethod::Bridge { host, real_name } => {
                whois.host.as_deref() == Some(host.as_str())
                    && whois.real_name.as_deref() == Some(real_name.as_str())
            }
        }
    }
}

/// A person from the config file's `people` list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub uuid: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub auth: Vec<AuthMethod>,
}

/// Callback run once a nick's WHOIS is resolved.
pub type Continuation = Box<dyn FnOnce(&WhoisResponse) + Send>;

struct PendingWhois {
    partial: WhoisResponse,
    continuations: Vec<Continuation>,
    issued: Instant,
}

/// The WHOIS accumulation state machine and identity cache.
pub struct IdentityResolver {
    bus: Arc<Bus>,
    cache: TtlCache<Nick, WhoisResponse>,
    pending: Mutex<HashMap<Nick, PendingWhois>>,
    whois_timeout: Duration,
    people: Vec<Person>,
}

impl IdentityResolver {
    /// Build a resolver over `bus` with the given person list, cache TTL,
    /// and outstanding-query timeout.
    pub fn new(
        bus: Arc<Bus>,
        people: Vec<Person>,
        cache_ttl: Duration,
        whois_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(IdentityResolver {
            bus,
            cache: TtlCache::new(cache_ttl),
            pending: Mutex::new(HashMap::new()),
            whois_timeout,
            people,
        })
    }

    /// Resolve `nick`, running `continuation` with the WHOIS response.
    ///
    /// Cache hits run the continuation before returning. Otherwise the
    /// continuation is queued; the first queued request for a nick issues
    /// the WHOIS query, later ones piggyback on it. An outstanding query
    /// older than the timeout is presumed lost (the connection dropped
    /// before the end-of-WHOIS arrived) and is reissued, keeping every
    /// queued continuation.
    pub fn request(&self, nick: Nick, continuation: Continuation) {
        if let Some(whois) = self.cache.get(&nick) {
            continuation(&whois);
            return;
        }
        let issue_query = {
            let mut pending = self.pending.lock();
            match pending.entry(nick.clone()) {
                Entry::Occupied(mut entry) => {
                    let slot = entry.get_mut();
                    slot.continuations.push(continuation);
                    if slot.issued.elapsed() >= self.whois_timeout {
                        slot.partial = WhoisResponse::default();
                        slot.issued = Instant::now();
                        true
                    } else {
                        false
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(PendingWhois {
                        partial: WhoisResponse::default(),
                        continuations: vec![continuation],
                        issued: Instant::now(),
                    });
                    true
                }
            }
        };
        if issue_query {
            debug!(nick = nick.as_str(), "issuing WHOIS");
            self.bus.publish(
                channels::MESSAGE_OUT,
                IDENTITY,
                &Payload::Message(Message::whois(nick.as_str())),
            );
        }
    }

    /// Match an assembled WHOIS response against the configured people.
    pub fn authorize(&self, nick: &Nick, whois: &WhoisResponse) -> AuthContext {
        for person in &self.people {
            if person.auth.iter().any(|m| m.matches(nick, whois)) {
                return AuthContext {
                    uuid: Some(person.uuid.clone()),
                    groups: person.groups.clone(),
                };
            }
        }
        AuthContext::anonymous()
    }

    /// Drop any cached identity for `nick`.
    pub fn evict(&self, nick: &Nick) {
        if self.cache.remove(nick).is_some() {
            debug!(nick = nick.as_str(), "evicted cached identity");
        }
    }

    /// Feed one inbound message through the resolver.
    ///
    /// WHOIS numerics update the per-nick accumulation state; PART, QUIT,
    /// and KICK evict; PRIVMSG triggers resolution of the sender and the
    /// re-publish on `auth_message_in`.
    pub fn handle_message(self: &Arc<Self>, msg: &Message) {
        if let Some(reply) = msg.reply() {
            self.handle_reply(reply, msg);
            return;
        }
        match msg.command.as_str() {
            "PRIVMSG" => {
                if let Ok(privmsg) = Privmsg::try_from(msg) {
                    self.resolve_and_republish(&privmsg.sender, msg);
                }
            }
            "PART" => {
                if let Ok(part) = Part::try_from(msg) {
                    self.evict(&part.nick);
                }
            }
            "QUIT" => {
                if let Ok(quit) = Quit::try_from(msg) {
                    self.evict(&quit.nick);
                }
            }
            "KICK" => {
                if let Ok(kick) = Kick::try_from(msg) {
                    self.evict(&kick.victim);
                }
            }
            _ => {}
        }
    }

    fn resolve_and_republish(self: &Arc<Self>, sender: &Nick, msg: &Message) {
        let resolver = Arc::clone(self);
        let nick = sender.clone();
        let original = msg.clone();
        self.request(
            sender.clone(),
            Box::new(move |whois| {
                let auth = resolver.authorize(&nick, whois);
                resolver.bus.publish(
                    channels::AUTH_MESSAGE_IN,
                    IDENTITY,
                    &Payload::AuthMessage(original, auth),
                );
            }),
        );
    }

    fn with_pending<F>(&self, nick: &Nick, update: F)
    where
        F: FnOnce(&mut WhoisResponse),
    {
        if let Some(entry) = self.pending.lock().get_mut(nick) {
            update(&mut entry.partial);
        }
    }

    fn handle_reply(&self, reply: Reply, msg: &Message) {
        // WHOIS numerics all carry [me, nick, ...].
        let Some(nick) = msg.params.get(1).and_then(|s| Nick::new(s).ok()) else {
            return;
        };
        let param = |i: usize| msg.params.get(i).cloned();
        match reply {
            Reply::WhoisUser => self.with_pending(&nick, |w| {
                w.user = param(2);
                w.host = param(3);
                w.real_name = param(5);
            }),
            Reply::WhoisServer => self.with_pending(&nick, |w| {
                w.server = param(2);
                w.server_info = param(3);
            }),
            Reply::Away => self.with_pending(&nick, |w| {
                w.away = param(2);
            }),
            Reply::WhoisRegNick | Reply::WhoisSpecial | Reply::WhoisAccount => {
                self.with_pending(&nick, |w| {
                    w.nick_identified = true;
                });
            }
            Reply::EndOfWhois => {
                let finished = self.pending.lock().remove(&nick);
                if let Some(finished) = finished {
                    debug!(nick = nick.as_str(), "WHOIS complete");
                    self.cache.insert(nick, finished.partial.clone());
                    // Continuations run outside every lock; they are free
                    // to call back into the resolver.
                    for continuation in finished.continuations {
                        continuation(&finished.partial);
                    }
                }
            }
            _ => {}
        }
    }
}

/// The plugin wrapper that wires the resolver onto the bus.
pub struct IdentityPlugin {
    bus: Arc<Bus>,
    resolver: Arc<IdentityResolver>,
}

impl IdentityPlugin {
    /// Factory registered under `core.identity`.
    pub fn create(ctx: &PluginContext) -> Result<Arc<dyn Plugin>, PluginError> {
        let mut view = ConfigView::new(Arc::clone(&ctx.config), Arc::clone(&ctx.bus), IDENTITY);
        view.register_location("core", "identity");
        let ttl = view.i64_or("cache_ttl_secs", DEFAULT_CACHE_TTL_SECS).max(0) as u64;
        let whois_timeout = view
            .i64_or("whois_timeout_secs", DEFAULT_WHOIS_TIMEOUT_SECS)
            .max(0) as u64;

        let people = match ctx.config.get_path("people") {
            Ok(value) => value
                .try_into::<Vec<Person>>()
                .map_err(crate::error::ConfigError::Parse)
                .map_err(PluginError::Config)?,
            Err(e) if e.is_missing() => Vec::new(),
            Err(e) => return Err(PluginError::Config(e)),
        };
        if people.is_empty() {
            warn!("no people configured; all traffic resolves anonymous");
        }

        let resolver = IdentityResolver::new(
            Arc::clone(&ctx.bus),
            people,
            Duration::from_secs(ttl),
            Duration::from_secs(whois_timeout),
        );
        Ok(Arc::new(IdentityPlugin {
            bus: Arc::clone(&ctx.bus),
            resolver,
        }))
    }

    /// The resolver, for plugins that need direct deferred requests.
    pub fn resolver(&self) -> Arc<IdentityResolver> {
        Arc::clone(&self.resolver)
    }
}

#[async_trait]
impl Plugin for IdentityPlugin {
    fn identity(&self) -> &str {
        IDENTITY
    }

    async fn start(&self) -> Result<(), PluginError> {
        let resolver = Arc::clone(&self.resolver);
        self.bus
            .subscribe(channels::MESSAGE_IN, IDENTITY, move |_, payload| {
                if let Payload::Message(msg) = payload {
                    resolver.handle_message(msg);
                }
            });
        Ok(())
    }

    async fn stop(&self) {
        self.bus.unsubscribe_all(IDENTITY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Message {
        line.parse().unwrap()
    }

    fn resolver_with(people: Vec<Person>) -> (Arc<Bus>, Arc<IdentityResolver>) {
        let bus = Bus::new();
        let resolver = IdentityResolver::new(
            Arc::clone(&bus),
            people,
            Duration::from_secs(300),
            Duration::from_secs(30),
        );
        (bus, resolver)
    }

    fn whois_queries(bus: &Arc<Bus>) -> Arc<Mutex<Vec<String>>> {
        let queries = Arc::new(Mutex::new(Vec::new()));
        {
            let queries = Arc::clone(&queries);
            bus.subscribe(channels::MESSAGE_OUT, "test", move |_, payload| {
                if let Payload::Message(msg) = payload {
                    if msg.command == "WHOIS" {
                        queries.lock().push(msg.params[0].clone());
                    }
                }
            });
        }
        queries
    }

    fn feed_whois_replies(resolver: &Arc<IdentityResolver>, nick: &str, identified: bool) {
        resolver.handle_message(&parse(&format!(
            ":server 311 me {nick} ~user host.example.org * :Real Name"
        )));
        resolver.handle_message(&parse(&format!(
            ":server 312 me {nick} irc.example.org :An IRC Server"
        )));
        if identified {
            resolver.handle_message(&parse(&format!(
                ":server 330 me {nick} account :is logged in as"
            )));
        }
        resolver.handle_message(&parse(&format!(
            ":server 318 me {nick} :End of /WHOIS list"
        )));
    }

    fn alice_person() -> Person {
        Person {
            uuid: "u-alice".to_owned(),
            groups: vec!["admin".to_owned()],
            auth: vec![AuthMethod::Nickserv {
                nick: "alice".to_owned(),
            }],
        }
    }

    #[test]
    fn deferred_request_issues_one_query_and_fires_once() {
        let (bus, resolver) = resolver_with(vec![]);
        let queries = whois_queries(&bus);
        let fired = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let fired = Arc::clone(&fired);
            resolver.request(
                "alice".parse().unwrap(),
                Box::new(move |whois| fired.lock().push(whois.clone())),
            );
        }
        // Two queued requests, one outstanding query, nothing fired yet.
        assert_eq!(*queries.lock(), vec!["alice"]);
        assert!(fired.lock().is_empty());

        feed_whois_replies(&resolver, "alice", false);

        let fired = fired.lock();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].user.as_deref(), Some("~user"));
        assert_eq!(fired[0].host.as_deref(), Some("host.example.org"));
        assert_eq!(fired[0].real_name.as_deref(), Some("Real Name"));
        assert_eq!(fired[0].server.as_deref(), Some("irc.example.org"));
        assert!(!fired[0].nick_identified);
    }

    #[test]
    fn cached_request_resolves_synchronously() {
        let (bus, resolver) = resolver_with(vec![]);
        let queries = whois_queries(&bus);

        resolver.request("alice".parse().unwrap(), Box::new(|_| {}));
        feed_whois_replies(&resolver, "alice", false);
        assert_eq!(queries.lock().len(), 1);

        let fired = Arc::new(Mutex::new(0usize));
        {
            let fired = Arc::clone(&fired);
            resolver.request(
                "alice".parse().unwrap(),
                Box::new(move |_| *fired.lock() += 1),
            );
        }
        // No second query; continuation ran before request returned.
        assert_eq!(queries.lock().len(), 1);
        assert_eq!(*fired.lock(), 1);
    }

    #[test]
    fn cache_lookup_is_case_insensitive() {
        let (_bus, resolver) = resolver_with(vec![]);
        resolver.request("Alice".parse().unwrap(), Box::new(|_| {}));
        feed_whois_replies(&resolver, "Alice", false);

        let fired = Arc::new(Mutex::new(0usize));
        {
            let fired = Arc::clone(&fired);
            resolver.request(
                "ALICE".parse().unwrap(),
                Box::new(move |_| *fired.lock() += 1),
            );
        }
        assert_eq!(*fired.lock(), 1);
    }

    #[test]
    fn part_quit_kick_evict_and_force_a_fresh_query() {
        for leave in [
            ":alice!~u@h QUIT :bye",
            ":alice!~u@h PART #room :bye",
            ":op!~u@h KICK #room alice :out",
        ] {
            let (bus, resolver) = resolver_with(vec![]);
            let queries = whois_queries(&bus);

            resolver.request("alice".parse().unwrap(), Box::new(|_| {}));
            feed_whois_replies(&resolver, "alice", false);
            assert_eq!(queries.lock().len(), 1);

            resolver.handle_message(&parse(leave));

            resolver.request("alice".parse().unwrap(), Box::new(|_| {}));
            assert_eq!(queries.lock().len(), 2, "no fresh query after {leave:?}");
        }
    }

    #[test]
    fn away_and_identified_variants_accumulate() {
        let (_bus, resolver) = resolver_with(vec![]);
        let captured = Arc::new(Mutex::new(None));
        {
            let captured = Arc::clone(&captured);
            resolver.request(
                "alice".parse().unwrap(),
                Box::new(move |w| *captured.lock() = Some(w.clone())),
            );
        }
        resolver.handle_message(&parse(":server 301 me alice :gone fishing"));
        // 307 and 320 are alternate "identified" spellings; any one is
        // enough.
        resolver.handle_message(&parse(":server 307 me alice :is a registered nick"));
        resolver.handle_message(&parse(":server 318 me alice :End of /WHOIS list"));

        let whois = captured.lock().clone().unwrap();
        assert_eq!(whois.away.as_deref(), Some("gone fishing"));
        assert!(whois.nick_identified);
    }

    #[test]
    fn stalled_query_is_reissued_and_still_resolves() {
        // Timeout of zero: any outstanding query counts as lost.
        let bus = Bus::new();
        let resolver = IdentityResolver::new(
            Arc::clone(&bus),
            vec![],
            Duration::from_secs(300),
            Duration::ZERO,
        );
        let queries = whois_queries(&bus);
        let fired = Arc::new(Mutex::new(0usize));

        resolver.request("alice".parse().unwrap(), Box::new(|_| {}));
        assert_eq!(queries.lock().len(), 1);

        // The 318 never arrived; the next request must not wedge on the
        // dead entry.
        {
            let fired = Arc::clone(&fired);
            resolver.request(
                "alice".parse().unwrap(),
                Box::new(move |_| *fired.lock() += 1),
            );
        }
        assert_eq!(queries.lock().len(), 2);

        feed_whois_replies(&resolver, "alice", false);
        assert_eq!(*fired.lock(), 1);
    }

    #[test]
    fn stray_numerics_without_a_request_are_ignored() {
        let (_bus, resolver) = resolver_with(vec![]);
        feed_whois_replies(&resolver, "nobody", true);
        assert!(resolver.cache.is_empty());
    }

    #[test]
    fn nickserv_authorization_requires_identified_flag() {
        let (_bus, resolver) = resolver_with(vec![alice_person()]);
        let nick: Nick = "alice".parse().unwrap();

        let unidentified = WhoisResponse::default();
        assert_eq!(resolver.authorize(&nick, &unidentified), AuthContext::anonymous());

        let identified = WhoisResponse {
            nick_identified: true,
            ..WhoisResponse::default()
        };
        let auth = resolver.authorize(&nick, &identified);
        assert_eq!(auth.uuid.as_deref(), Some("u-alice"));
        assert!(auth.in_group("admin"));

        // Someone else identified to services is still not alice.
        let other: Nick = "mallory".parse().unwrap();
        assert_eq!(resolver.authorize(&other, &identified), AuthContext::anonymous());
    }

    #[test]
    fn bridge_authorization_matches_host_and_real_name() {
        let person = Person {
            uuid: "u-bob".to_owned(),
            groups: vec![],
            auth: vec![AuthMethod::Bridge {
                host: "bridge.example.org".to_owned(),
                real_name: "Bob B".to_owned(),
            }],
        };
        let (_bus, resolver) = resolver_with(vec![person]);
        let nick: Nick = "bob".parse().unwrap();

        let whois = WhoisResponse {
            host: Some("bridge.example.org".to_owned()),
            real_name: Some("Bob B".to_owned()),
            ..WhoisResponse::default()
        };
        assert!(resolver.authorize(&nick, &whois).is_identified());

        let wrong_host = WhoisResponse {
            host: Some("elsewhere.example.org".to_owned()),
            real_name: Some("Bob B".to_owned()),
            ..WhoisResponse::default()
        };
        assert!(!resolver.authorize(&nick, &wrong_host).is_identified());
    }

    #[test]
    fn privmsg_is_republished_with_resolved_context() {
        let (bus, resolver) = resolver_with(vec![alice_person()]);
        let republished = Arc::new(Mutex::new(Vec::new()));
        {
            let republished = Arc::clone(&republished);
            bus.subscribe(channels::AUTH_MESSAGE_IN, "test", move |_, payload| {
                if let Payload::AuthMessage(msg, auth) = payload {
                    republished.lock().push((msg.clone(), auth.clone()));
                }
            });
        }

        resolver.handle_message(&parse(":alice!~a@h PRIVMSG #room :.load core.admin"));
        assert!(republished.lock().is_empty());

        feed_whois_replies(&resolver, "alice", true);

        let republished = republished.lock();
        assert_eq!(republished.len(), 1);
        let (msg, auth) = &republished[0];
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(auth.uuid.as_deref(), Some("u-alice"));
    }

    #[test]
    fn people_deserialize_from_config() {
        let value: toml::Value = toml::from_str(
            r#"
            [[people]]
            uuid = "u-alice"
            groups = ["admin"]

            [[people.auth]]
            method = "nickserv"
            nick = "alice"

            [[people.auth]]
            method = "bridge"
            host = "bridge.example.org"
            real_name = "Alice A"
            "#,
        )
        .unwrap();
        let people: Vec<Person> = value
            .get("people")
            .cloned()
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].auth.len(), 2);
        assert_eq!(
            people[0].auth[0],
            AuthMethod::Nickserv {
                nick: "alice".to_owned()
            }
        );
    }
}
