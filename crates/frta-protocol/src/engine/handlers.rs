use std::time::Duration;

use crate::route_cache::RouteEntry;
use crate::types::{
    InterfaceId, NodeAddress, Target, ADVERTISE_MIN_TRUST, DEFAULT_TRUST, MAX_HOP_COUNT,
    REVERSE_ROUTE_TRUST, ROUTE_CACHE_TIMEOUT,
};
use crate::wire::{
    ControlMessage, MessageType, RouteAdvertisement, RouteReply, RouteRequest, TrustTag,
};

use super::effect::{EngineEffect, Timer};
use super::state::Engine;
use super::ProtocolEvent;

impl Engine {
    // ── Incoming control traffic ────────────────────────────────────────

    /// Process one datagram received from `sender` on the control port.
    pub fn handle_packet(
        &mut self,
        now: Duration,
        sender: NodeAddress,
        data: &[u8],
    ) -> Vec<EngineEffect> {
        let span = self.span.clone();
        let _enter = span.enter();

        if !self.running {
            return Vec::new();
        }
        if self.is_local(sender) {
            // Our own broadcast looped back.
            self.metrics.packets_dropped.inc();
            return Vec::new();
        }
        if data
            .first()
            .is_some_and(|tag| MessageType::try_from_tag(*tag).is_none())
        {
            self.metrics.decode_fallbacks.inc();
        }
        let message = match ControlMessage::from_bytes(data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%sender, error = %e, "dropping undecodable control packet");
                self.metrics.packets_dropped.inc();
                return vec![EngineEffect::Emit(ProtocolEvent::MessageDropped {
                    sender,
                    reason: e.to_string(),
                })];
            }
        };
        self.trust.mark_active(sender);

        match message {
            ControlMessage::RouteRequest(req) => self.handle_request(now, sender, req),
            ControlMessage::RouteReply(reply) => self.handle_reply(now, sender, reply),
            ControlMessage::RouteAdvertisement(adv) => self.handle_advertisement(now, sender, adv),
            ControlMessage::TrustUpdate(tag) => self.handle_trust_update(sender, tag),
        }
    }

    fn handle_request(
        &mut self,
        now: Duration,
        sender: NodeAddress,
        req: RouteRequest,
    ) -> Vec<EngineEffect> {
        if self.is_local(req.source) {
            tracing::trace!(destination = %req.destination, "ignoring own request");
            return Vec::new();
        }
        tracing::debug!(
            %sender,
            source = %req.source,
            destination = %req.destination,
            hop_count = req.hop_count,
            "route request"
        );

        let interface = self.reply_interface();
        self.cache.add_or_update(
            req.source,
            RouteEntry::new(
                sender,
                REVERSE_ROUTE_TRUST,
                req.hop_count.saturating_add(1),
                interface,
                now,
            ),
        );
        self.trust.update(sender, REVERSE_ROUTE_TRUST);

        if self.is_local(req.destination) {
            return vec![self.originate_reply(sender, req.destination, req.destination)];
        }
        if let Some(entry) = self.cache.get(now, req.destination) {
            let via = entry.next_hop;
            return vec![self.originate_reply(sender, req.destination, via)];
        }
        if req.hop_count < MAX_HOP_COUNT {
            self.discovery
                .record_relay(req.destination, req.source, now);
            self.metrics.requests_forwarded.inc();
            let forwarded = ControlMessage::RouteRequest(req.next_hop());
            return vec![self.send_jittered(Target::Broadcast, forwarded)];
        }
        tracing::debug!(destination = %req.destination, "request reached hop limit");
        self.metrics.requests_hop_limited.inc();
        Vec::new()
    }

    /// Reply to a request on behalf of `destination`, reached through `via`.
    fn originate_reply(
        &mut self,
        to: NodeAddress,
        destination: NodeAddress,
        via: NodeAddress,
    ) -> EngineEffect {
        let reply = RouteReply {
            destination,
            next_hop: via,
            trust: self.trust.get(to),
        };
        tracing::debug!(%to, %destination, %via, trust = reply.trust, "sending route reply");
        self.metrics.replies_sent.inc();
        self.send_jittered(Target::Unicast(to), ControlMessage::RouteReply(reply))
    }

    fn handle_reply(
        &mut self,
        now: Duration,
        sender: NodeAddress,
        reply: RouteReply,
    ) -> Vec<EngineEffect> {
        self.metrics.replies_received.inc();
        self.trust.update(sender, reply.trust);
        if !self.is_local(reply.next_hop) {
            self.trust.update(reply.next_hop, reply.trust);
        }
        let destination = reply.destination;
        if self.is_local(destination) {
            return Vec::new();
        }

        let interface = self.reply_interface();
        let entry = RouteEntry::new(sender, reply.trust, 1, interface, now);
        let trust = entry.trust;
        self.cache.add_or_update(destination, entry);
        tracing::debug!(%destination, via = %sender, trust, "route learned from reply");

        let mut effects = Vec::new();
        if let Some(issued_at) = self.discovery.complete(destination, now) {
            self.metrics.discoveries_completed.inc();
            tracing::info!(%destination, next_hop = %sender, trust, "route discovered");
            effects.push(EngineEffect::Emit(ProtocolEvent::RouteDiscovered {
                destination,
                next_hop: sender,
                trust,
                hop_count: 1,
                elapsed: now.saturating_sub(issued_at),
            }));
        }

        for originator in self.discovery.relay_originators(destination, now) {
            if self.is_local(originator) {
                continue;
            }
            let Some(back) = self.cache.get(now, originator).map(|e| e.next_hop) else {
                tracing::debug!(%originator, "no reverse route to relay reply");
                continue;
            };
            if back == sender {
                continue;
            }
            self.metrics.replies_relayed.inc();
            let relayed = RouteReply {
                destination,
                next_hop: sender,
                trust: reply.trust,
            };
            effects.push(
                self.send_jittered(Target::Unicast(back), ControlMessage::RouteReply(relayed)),
            );
        }
        effects
    }

    fn handle_advertisement(
        &mut self,
        now: Duration,
        sender: NodeAddress,
        adv: RouteAdvertisement,
    ) -> Vec<EngineEffect> {
        if self.is_local(adv.destination) {
            return Vec::new();
        }
        let hop_count = adv.hop_count.saturating_add(1);
        let adopt = match self.cache.get(now, adv.destination) {
            None => true,
            Some(current) => adv.trust > current.trust && hop_count < current.hop_count,
        };
        if adopt {
            let interface = self.reply_interface();
            self.cache.add_or_update(
                adv.destination,
                RouteEntry::new(sender, adv.trust, hop_count, interface, now),
            );
            self.metrics.advertisements_adopted.inc();
            tracing::debug!(
                destination = %adv.destination,
                via = %sender,
                hop_count,
                "adopted advertised route"
            );
        }
        Vec::new()
    }

    fn handle_trust_update(
        &mut self,
        sender: NodeAddress,
        tag: Option<TrustTag>,
    ) -> Vec<EngineEffect> {
        let observed = tag.map_or(DEFAULT_TRUST, |t| t.trust);
        let trust = self.trust.update(sender, observed);
        self.metrics.trust_updates_received.inc();
        tracing::trace!(%sender, observed, trust, "trust update");
        Vec::new()
    }

    // ── Timers ──────────────────────────────────────────────────────────

    pub fn handle_timer(&mut self, now: Duration, timer: Timer) -> Vec<EngineEffect> {
        let span = self.span.clone();
        let _enter = span.enter();

        match timer {
            Timer::RequestTimeout {
                destination,
                issued_at,
            } => {
                if !self.discovery.expire(destination, issued_at, now) {
                    return Vec::new();
                }
                tracing::info!(%destination, "route discovery timed out");
                self.metrics.discoveries_timed_out.inc();
                vec![EngineEffect::Emit(ProtocolEvent::DiscoveryTimedOut {
                    destination,
                })]
            }
            Timer::DeferredSend { target, packet } => {
                if !self.running {
                    return Vec::new();
                }
                vec![EngineEffect::transmit(target, packet)]
            }
            Timer::RoutingUpdate { epoch } => {
                if !self.is_current(epoch) {
                    return Vec::new();
                }
                let mut effects = self.routing_update(now);
                effects.push(EngineEffect::schedule(
                    self.config.update_interval,
                    Timer::RoutingUpdate { epoch },
                ));
                effects
            }
            Timer::Advertise { epoch } => {
                if !self.is_current(epoch) {
                    return Vec::new();
                }
                let mut effects = self.advertise(now);
                effects.push(EngineEffect::schedule(
                    self.config.update_interval,
                    Timer::Advertise { epoch },
                ));
                effects
            }
            Timer::CacheSweep { epoch } => {
                if !self.is_current(epoch) {
                    return Vec::new();
                }
                let mut effects = self.sweep(now);
                effects.push(EngineEffect::schedule(
                    ROUTE_CACHE_TIMEOUT,
                    Timer::CacheSweep { epoch },
                ));
                effects
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.running && epoch == self.epoch
    }

    /// One trust-update broadcast per known destination, carrying our trust in it.
    pub(crate) fn routing_update(&mut self, now: Duration) -> Vec<EngineEffect> {
        self.install_self_routes(now);
        let effects: Vec<EngineEffect> = self
            .cache
            .destinations()
            .map(|dest| {
                EngineEffect::transmit(
                    Target::Broadcast,
                    ControlMessage::TrustUpdate(Some(TrustTag {
                        trust: self.trust.get(dest),
                    })),
                )
            })
            .collect();
        self.metrics.trust_updates_sent.inc_by(effects.len() as u64);
        tracing::debug!(count = effects.len(), "routing update");
        effects
    }

    /// Advertise every fresh route with trust strictly above 0.5.
    pub(crate) fn advertise(&mut self, now: Duration) -> Vec<EngineEffect> {
        let effects: Vec<EngineEffect> = self
            .cache
            .fresh(now)
            .filter(|(_, entry)| entry.trust > ADVERTISE_MIN_TRUST)
            .map(|(destination, entry)| {
                EngineEffect::transmit(
                    Target::Broadcast,
                    ControlMessage::RouteAdvertisement(RouteAdvertisement {
                        destination,
                        next_hop: entry.next_hop,
                        trust: entry.trust,
                        hop_count: entry.hop_count,
                    }),
                )
            })
            .collect();
        self.metrics.advertisements_sent.inc_by(effects.len() as u64);
        tracing::debug!(count = effects.len(), "route advertisement");
        effects
    }

    /// Evict expired and invalid routes. Local self-routes are refreshed first.
    pub(crate) fn sweep(&mut self, now: Duration) -> Vec<EngineEffect> {
        self.install_self_routes(now);
        self.discovery.prune_relays(now);
        let removed = self.cache.sweep(now);
        self.metrics.routes_expired.inc_by(removed.len() as u64);
        self.metrics.route_cache_size.set(self.cache.len() as u64);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "expired routes removed");
        }
        removed
            .into_iter()
            .map(|destination| EngineEffect::Emit(ProtocolEvent::RouteExpired { destination }))
            .collect()
    }

    fn reply_interface(&self) -> InterfaceId {
        self.primary().map_or(0, |(interface, _)| interface)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
