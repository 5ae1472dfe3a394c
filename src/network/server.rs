//! The authoritative server session: player lifecycle, handshakes,
//! coordinate reconciliation and the remote console login.

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::codec::Writer;
use crate::constants::net::{INGEST_QUEUE_DEPTH, MAX_PLAYERS, SV_VERSION, WARP_LIMIT};
use crate::fixed::Fixed;
use crate::network::protocol::{Packet, PacketType, SendTarget};
use crate::network::smoother::Smoother;
use crate::world::player::{Player, PlayerFlags};
use crate::world::thinker::ThinkerKind;
use crate::world::World;

const WELCOME: &str = "Welcome to the server.";

/// Per-slot server-side client state wrapped around the player.
pub struct ServerPlayer {
    pub player: Player,
    /// Network node, 0 when the slot is free.
    pub node_id: u32,
    /// Handshake sent, client ack pending.
    pub handshake: bool,
    /// Client is ready to receive frames.
    pub ready: bool,
    /// Milliseconds; send timestamp until the ack turns it into a ping.
    pub shake_ping: u64,
    pub enter_time: f32,
    pub smoother: Smoother,
    /// Ticks until an unacked fix is re-emitted.
    pub fix_resend: i32,
}

impl Default for ServerPlayer {
    fn default() -> Self {
        ServerPlayer {
            player: Player::default(),
            node_id: 0,
            handshake: false,
            ready: false,
            shake_ping: 0,
            enter_time: 0.0,
            smoother: Smoother::new(),
            fix_resend: 0,
        }
    }
}

impl ServerPlayer {
    pub fn is_connected(&self) -> bool {
        self.node_id != 0
    }
}

pub struct ServerSession {
    pub players: Vec<ServerPlayer>,
    pub game_time: f32,
    /// Identity key clients must present in `PCL_HELLO2`.
    pub game_id: String,
    pub password: String,
    /// The single allowed remote console user.
    remote_user: Option<u8>,
    /// Outgoing packets for the transport layer to flush.
    pub outbox: Vec<(SendTarget, Packet)>,
    /// Commands received over `PKT_COMMAND2`, for the console.
    pub pending_commands: Vec<String>,
    pub warp_limit: f64,
    ingest_tx: Sender<Packet>,
    ingest_rx: Receiver<Packet>,
}

impl ServerSession {
    pub fn new(game_id: &str, password: &str) -> ServerSession {
        let (ingest_tx, ingest_rx) = bounded(INGEST_QUEUE_DEPTH);
        ServerSession {
            players: (0..MAX_PLAYERS).map(|_| ServerPlayer::default()).collect(),
            game_time: 0.0,
            game_id: game_id.to_string(),
            password: password.to_string(),
            remote_user: None,
            outbox: Vec::new(),
            pending_commands: Vec::new(),
            warp_limit: WARP_LIMIT,
            ingest_tx,
            ingest_rx,
        }
    }

    /// Producer handle for the receive thread. Single producer, single
    /// consumer; the sim thread drains it at tick boundaries.
    pub fn ingest_sender(&self) -> Sender<Packet> {
        self.ingest_tx.clone()
    }

    pub fn start_net_game(&mut self) {
        for plr in &mut self.players {
            *plr = ServerPlayer::default();
        }
        self.game_time = 0.0;
        self.remote_user = None;
        log::info!("[ServerSession::start_net_game] Server is player 0");
    }

    pub fn num_players(&self) -> usize {
        self.players.iter().filter(|p| p.player.in_game).count()
    }

    pub fn num_connected(&self) -> usize {
        self.players[1..].iter().filter(|p| p.is_connected()).count()
    }

    fn send(&mut self, target: SendTarget, packet: Packet) {
        self.outbox.push((target, packet));
    }

    pub fn send_text(&mut self, to: u8, text: &str) {
        let mut w = Writer::new();
        w.write_string(text);
        let packet = Packet::with_payload(0, PacketType::PsvConsoleText, w.into_bytes());
        self.send(SendTarget::To(to), packet);
    }

    /// Assign a console to a newly connected node. Consoles start at 1;
    /// 0 is the server itself.
    pub fn player_arrives(&mut self, node_id: u32, name: &str) -> Option<u8> {
        log::info!("[ServerSession::player_arrives] '{}' has arrived", name);

        for i in 1..MAX_PLAYERS {
            if self.players[i].is_connected() {
                continue;
            }
            let plr = &mut self.players[i];
            plr.player = Player {
                name: name.to_string(),
                ..Player::default()
            };
            plr.player.fix_acked = crate::world::player::FixCounters {
                angles: -1,
                origin: -1,
                mom: -1,
            };
            plr.node_id = node_id;
            plr.ready = false;
            plr.handshake = false;
            plr.smoother.clear();

            log::info!(
                "[ServerSession::player_arrives] '{}' assigned to console {} (node:{})",
                name,
                i,
                node_id
            );
            return Some(i as u8);
        }
        log::warn!("[ServerSession::player_arrives] No free slots");
        None
    }

    /// Remove a node's player from the game.
    pub fn player_leaves(&mut self, node_id: u32) {
        let Some(console) = self.console_of_node(node_id) else {
            return;
        };
        self.drop_console(console);
    }

    fn drop_console(&mut self, console: u8) {
        // Log off automatically.
        if self.remote_user == Some(console) {
            self.remote_user = None;
        }

        let plr = &mut self.players[console as usize];
        let was_in_game = plr.player.in_game;
        plr.player.in_game = false;
        plr.player.id = 0;
        plr.node_id = 0;
        plr.ready = false;
        plr.handshake = false;

        log::info!("[ServerSession::player_leaves] Console {} left", console);

        if was_in_game {
            let mut w = Writer::new();
            w.write_u8(console);
            let packet = Packet::with_payload(0, PacketType::PsvPlayerExit, w.into_bytes());
            self.send(SendTarget::Broadcast, packet);
        }
    }

    pub fn console_of_node(&self, node_id: u32) -> Option<u8> {
        if node_id == 0 {
            return None;
        }
        self.players
            .iter()
            .position(|p| p.node_id == node_id)
            .map(|i| i as u8)
    }

    /// Forcibly disconnect a client.
    pub fn kick(&mut self, console: u8) {
        if !self.players[console as usize].is_connected() {
            return;
        }
        self.send_text(console, "You were kicked out!");
        self.send(SendTarget::To(console), Packet::new(0, PacketType::PsvServerClose));
        self.drop_console(console);
    }

    /// Drain and process every queued packet, in receive order.
    pub fn get_packets(&mut self, world: &mut World, now_ms: u64) {
        while let Ok(packet) = self.ingest_rx.try_recv() {
            self.dispatch(packet, world, now_ms);
        }
    }

    fn dispatch(&mut self, packet: Packet, world: &mut World, now_ms: u64) {
        let from = packet.from;
        if from as usize >= MAX_PLAYERS {
            return;
        }

        match packet.ty {
            PacketType::PclGoodbye => {
                self.drop_console(from);
            }
            PacketType::PktCoords => {
                self.client_coords(from, &packet, world);
            }
            PacketType::PclAckShake => {
                let plr = &mut self.players[from as usize];
                plr.shake_ping = now_ms.saturating_sub(plr.shake_ping);
                log::info!(
                    "[ServerSession] Client {} ping at handshake: {} ms",
                    from,
                    plr.shake_ping
                );
            }
            PacketType::PclAckPlayerFix => {
                let mut r = packet.reader();
                let plr = &mut self.players[from as usize].player;
                if let (Ok(angles), Ok(origin), Ok(mom)) =
                    (r.read_i32(), r.read_i32(), r.read_i32())
                {
                    plr.fix_acked.angles = angles;
                    plr.fix_acked.origin = origin;
                    plr.fix_acked.mom = mom;
                }
            }
            PacketType::PktPing => {
                // Bounce it straight back.
                self.send(SendTarget::To(from), Packet::new(0, PacketType::PktPing));
            }
            PacketType::PclHello | PacketType::PclHello2 => {
                self.handle_hello(from, &packet, world, now_ms);
            }
            PacketType::PktOk => {
                self.handle_ok(from);
            }
            PacketType::PktChat => {
                self.handle_chat(&packet);
            }
            PacketType::PktPlayerInfo => {
                if let Ok(name) = packet.reader().read_string() {
                    log::info!("[ServerSession] Player {} is now '{}'", from, name);
                    self.players[from as usize].player.name = name;
                    self.broadcast_player_info(from);
                }
            }
            PacketType::PclFinaleRequest => {
                let mut r = packet.reader();
                if let (Ok(fid), Ok(params)) = (r.read_u32(), r.read_u16()) {
                    log::debug!("[ServerSession] Finale request fid={} params={}", fid, params);
                }
            }
            PacketType::PktLogin => {
                self.handle_login(from, &packet);
            }
            PacketType::PktCommand2 => {
                self.handle_command(from, &packet);
            }
            _ => {
                log::debug!(
                    "[ServerSession::dispatch] Unexpected client packet {:?}",
                    packet.ty
                );
            }
        }
    }

    fn handle_hello(&mut self, from: u8, packet: &Packet, world: &World, now_ms: u64) {
        let mut r = packet.reader();
        let Ok(id) = r.read_u32() else { return };
        log::debug!("[ServerSession::handle_hello] Hello from {} ({:08x})", from, id);

        let sender_fresh = {
            let plr = &self.players[from as usize];
            !plr.player.in_game && !plr.handshake
        };

        // Check for duplicate ids among the other connected consoles.
        if sender_fresh {
            let duplicate = self
                .players
                .iter()
                .enumerate()
                .any(|(i, p)| i != from as usize && p.is_connected() && p.player.id == id);
            if duplicate {
                log::warn!(
                    "[ServerSession::handle_hello] Connection refused: duplicate id ({:08x})",
                    id
                );
                self.kick(from);
                return;
            }
        }

        self.players[from as usize].player.id = id;

        if packet.ty == PacketType::PclHello2 {
            // Check the game mode (max 16 chars).
            let Ok(game_id) = r.read_padded(16) else { return };
            if !game_id.eq_ignore_ascii_case(&self.game_id) {
                log::warn!(
                    "[ServerSession::handle_hello] Incompatible game id: {:-.16}",
                    game_id
                );
                self.kick(from);
                return;
            }
        }

        if sender_fresh {
            self.players[from as usize].handshake = true;
            self.players[from as usize].player.in_game = true;
            self.players[from as usize].enter_time = self.game_time;
            self.handshake(from, true, world, now_ms);
        } else if self.players[from as usize].player.in_game {
            // Already in the game; a re-handshake was requested.
            self.handshake(from, false, world, now_ms);
        }
    }

    /// Send the introductory handshake packets: versioned hello, the
    /// material dictionary, and the thing/state id lists.
    fn handshake(&mut self, console: u8, new_player: bool, world: &World, now_ms: u64) {
        log::debug!(
            "[ServerSession::handshake] Shaking hands with player {} (new:{})",
            console,
            new_player
        );

        let mut in_game_bits: u32 = 0;
        for (i, p) in self.players.iter().enumerate() {
            if p.is_connected() {
                in_game_bits |= 1 << i;
            }
        }

        let mut w = Writer::new();
        w.write_u8(SV_VERSION);
        w.write_u8(console);
        w.write_u32(in_game_bits);
        w.write_f32(self.game_time);
        let packet = Packet::with_payload(0, PacketType::PsvHandshake, w.into_bytes());
        self.send(SendTarget::To(console), packet);

        // The material dictionary.
        let mut w = Writer::new();
        w.write_u16(world.map.materials.len() as u16);
        for name in world.map.materials.names() {
            w.write_string(name);
        }
        let packet = Packet::with_payload(0, PacketType::PsvMaterialArchive, w.into_bytes());
        self.send(SendTarget::To(console), packet);

        // Thing type ids, indices matching the mobj info table.
        let mut w = Writer::new();
        w.write_u16(world.mobj_info.len() as u16);
        for info in &world.mobj_info {
            w.write_string(&info.name);
        }
        let packet = Packet::with_payload(0, PacketType::PsvMobjTypeIdList, w.into_bytes());
        self.send(SendTarget::To(console), packet);

        // State ids, indices matching the state table.
        let mut w = Writer::new();
        w.write_u16(world.states.len() as u16);
        for (i, _) in world.states.iter().enumerate() {
            w.write_string(&format!("S_{}", i));
        }
        let packet = Packet::with_payload(0, PacketType::PsvMobjStateIdList, w.into_bytes());
        self.send(SendTarget::To(console), packet);

        if new_player {
            self.players[console as usize].shake_ping = now_ms;
        }

        // Propagate client information both ways.
        for i in 0..MAX_PLAYERS as u8 {
            if !self.players[i as usize].is_connected() {
                continue;
            }
            self.send_player_info(i, console);
            if new_player && i != 0 && i != console {
                self.send_player_info(console, i);
            }
        }

        // Everything about this client's position is now suspect.
        self.players[console as usize].player.flags |=
            PlayerFlags::FIX_ANGLES | PlayerFlags::FIX_ORIGIN | PlayerFlags::FIX_MOM;
    }

    fn handle_ok(&mut self, from: u8) {
        let plr = &mut self.players[from as usize];
        plr.ready = true;
        log::debug!("[ServerSession::handle_ok] Client {} is ready", from);

        if plr.handshake {
            // Handshake acknowledged; sync the client's clock.
            plr.handshake = false;
            let mut w = Writer::new();
            w.write_f32(self.game_time);
            let packet = Packet::with_payload(0, PacketType::PsvSync, w.into_bytes());
            self.send(SendTarget::To(from), packet);
            self.send_text(from, WELCOME);
        }
    }

    fn handle_chat(&mut self, packet: &Packet) {
        let mut r = packet.reader();
        let Ok(msg_from) = r.read_u8() else { return };
        let Ok(mask) = r.read_u32() else { return };
        let Ok(text) = r.read_string() else { return };

        // Relay to all masked recipients except the sender.
        for i in 1..MAX_PLAYERS {
            if i == packet.from as usize {
                continue;
            }
            if self.players[i].player.in_game && mask & (1 << i) != 0 {
                let mut w = Writer::new();
                w.write_u8(msg_from);
                w.write_u32(mask);
                w.write_string(&text);
                let relay = Packet::with_payload(0, PacketType::PktChat, w.into_bytes());
                self.send(SendTarget::To(i as u8), relay);
            }
        }
    }

    fn send_player_info(&mut self, about: u8, to: u8) {
        let mut w = Writer::new();
        w.write_u8(about);
        w.write_string(&self.players[about as usize].player.name);
        let packet = Packet::with_payload(0, PacketType::PktPlayerInfo, w.into_bytes());
        self.send(SendTarget::To(to), packet);
    }

    fn broadcast_player_info(&mut self, about: u8) {
        for i in 1..MAX_PLAYERS as u8 {
            if i != about && self.players[i as usize].player.in_game {
                self.send_player_info(about, i);
            }
        }
    }

    fn handle_login(&mut self, from: u8, packet: &Packet) {
        if self.remote_user.is_some() {
            self.send_text(from, "Login: a client is already logged in.");
            return;
        }
        let mut r = packet.reader();
        let Ok(len) = r.read_u8() else { return };
        let Ok(bytes) = r.read_bytes(len as usize) else { return };
        let password = String::from_utf8_lossy(bytes);

        if password != self.password {
            self.send_text(from, "Login: invalid password.");
            return;
        }

        self.remote_user = Some(from);
        log::info!(
            "[ServerSession::handle_login] '{}' (client {}) logged in",
            self.players[from as usize].player.name,
            from
        );
        let mut w = Writer::new();
        w.write_u8(1); // Yes, you're logged in.
        let packet = Packet::with_payload(0, PacketType::PktLogin, w.into_bytes());
        self.send(SendTarget::To(from), packet);
    }

    /// Terminate the remote console session, if any.
    pub fn logout(&mut self) -> bool {
        let Some(user) = self.remote_user.take() else {
            return false;
        };
        self.send_text(user, "Goodbye...");
        let mut w = Writer::new();
        w.write_u8(0); // You're outta here.
        let packet = Packet::with_payload(0, PacketType::PktLogin, w.into_bytes());
        self.send(SendTarget::To(user), packet);
        true
    }

    fn handle_command(&mut self, from: u8, packet: &Packet) {
        if self.remote_user != Some(from) {
            log::warn!("[ServerSession::handle_command] Command but no one's logged in");
            return;
        }
        let mut r = packet.reader();
        let Ok(raw_len) = r.read_u16() else { return };
        let silent = raw_len & 0x8000 != 0;
        let len = (raw_len & 0x7fff) as usize;
        let Ok(_flags) = r.read_u16() else { return };
        let Ok(_source) = r.read_u8() else { return };
        let Ok(bytes) = r.read_bytes(len) else { return };

        let command = String::from_utf8_lossy(bytes).into_owned();
        log::debug!(
            "[ServerSession::handle_command] '{}' (silent:{})",
            command,
            silent
        );
        self.pending_commands.push(command);
    }

    /// Whether client-reported coordinates may enter the smoother.
    pub fn can_trust_client_pos(&self, console: u8) -> bool {
        let plr = &self.players[console as usize].player;
        plr.fix_counter.origin == plr.fix_acked.origin
            && !plr.flags.contains(PlayerFlags::FIX_ORIGIN)
    }

    /// A `PKT_COORDS` payload: client game time, position, angles and
    /// movement intent. Ignored entirely while a fix is outstanding.
    fn client_coords(&mut self, from: u8, packet: &Packet, world: &mut World) {
        let in_game = self.players[from as usize].player.in_game;
        let dead = self.players[from as usize]
            .player
            .flags
            .contains(PlayerFlags::DEAD);
        if !in_game || dead {
            return;
        }

        let mut r = packet.reader();
        let Ok(client_time) = r.read_f32() else { return };
        let Ok(x) = r.read_f32() else { return };
        let Ok(y) = r.read_f32() else { return };
        let Ok(raw_z) = r.read_i32() else { return };
        let Ok(raw_angle) = r.read_u16() else { return };
        let Ok(raw_look) = r.read_i16() else { return };
        let Ok(forward) = r.read_i8() else { return };
        let Ok(side) = r.read_i8() else { return };

        let mobj_id = self.players[from as usize].player.mobj;
        let mobj_floor = mobj_id
            .and_then(|id| world.thinkers.get(id))
            .and_then(|th| match &th.kind {
                ThinkerKind::Mobj(m) => Some(m.floor_z.to_float()),
                _ => None,
            });

        let (z, on_floor) = if raw_z == i32::MIN {
            (mobj_floor.unwrap_or(0.0), true)
        } else {
            (Fixed(raw_z).to_float(), false)
        };

        let angle = (raw_angle as u32) << 16;
        let look_dir = raw_look as f32 * 110.0 / i16::MAX as f32;

        // Movement intent, 1/8th map unit resolution.
        {
            let plr = &mut self.players[from as usize].player;
            plr.forward_move = forward as f32 / 8.0;
            plr.side_move = side as f32 / 8.0;
        }

        // Angles apply only when the client is caught up on angle fixes.
        let angles_ok = {
            let plr = &self.players[from as usize].player;
            plr.fix_counter.angles == plr.fix_acked.angles
                && !plr.flags.contains(PlayerFlags::FIX_ANGLES)
        };
        if angles_ok {
            self.players[from as usize].player.look_dir = look_dir;
            if let Some(id) = mobj_id {
                if let Some(th) = world.thinkers.get_mut(id) {
                    if let ThinkerKind::Mobj(m) = &mut th.kind {
                        m.angle = angle;
                    }
                }
            }
        }

        if self.can_trust_client_pos(from) {
            // Discrepancy beyond the warp limit triggers a forced fix.
            let server_pos = mobj_id
                .and_then(|id| world.thinkers.get(id))
                .and_then(|th| match &th.kind {
                    ThinkerKind::Mobj(m) => {
                        Some((m.pos[0].to_float(), m.pos[1].to_float()))
                    }
                    _ => None,
                });
            if let Some((sx, sy)) = server_pos {
                let dist = ((sx - x as f64).powi(2) + (sy - y as f64).powi(2)).sqrt();
                if dist > self.warp_limit {
                    log::debug!(
                        "[ServerSession::client_coords] Player {} warped {:.0} units; fixing",
                        from,
                        dist
                    );
                    self.players[from as usize].player.flags |= PlayerFlags::FIX_ORIGIN;
                    return;
                }
            }

            self.players[from as usize]
                .smoother
                .add_pos(client_time, x as f64, y as f64, z, on_floor);
        }
    }

    /// Emit a `PSV_PLAYER_FIX` for any pending overrides on the player.
    pub fn send_player_fixes(&mut self, console: u8, world: &World) {
        let fix_flags = {
            let plr = &self.players[console as usize].player;
            plr.flags
                & (PlayerFlags::FIX_ANGLES | PlayerFlags::FIX_ORIGIN | PlayerFlags::FIX_MOM)
        };
        if fix_flags.is_empty() {
            return; // Nothing to fix.
        }

        let Some(mobj_id) = self.players[console as usize].player.mobj else {
            return;
        };
        let Some((serial, angle, pos, mom)) =
            world.thinkers.get(mobj_id).and_then(|th| match &th.kind {
                ThinkerKind::Mobj(m) => Some((th.serial, m.angle, m.pos, m.mom)),
                _ => None,
            })
        else {
            return;
        };

        let mut fixes = 0u32;
        if fix_flags.contains(PlayerFlags::FIX_ANGLES) {
            fixes |= 1;
        }
        if fix_flags.contains(PlayerFlags::FIX_ORIGIN) {
            fixes |= 2;
        }
        if fix_flags.contains(PlayerFlags::FIX_MOM) {
            fixes |= 4;
        }

        let mut w = Writer::new();
        w.write_u8(console);
        w.write_u32(fixes);
        w.write_u16(serial as u16);

        let plr = &mut self.players[console as usize].player;
        if fix_flags.contains(PlayerFlags::FIX_ANGLES) {
            plr.fix_counter.angles += 1;
            w.write_i32(plr.fix_counter.angles);
            w.write_u32(angle);
            w.write_f32(plr.look_dir);
        }
        if fix_flags.contains(PlayerFlags::FIX_ORIGIN) {
            plr.fix_counter.origin += 1;
            w.write_i32(plr.fix_counter.origin);
            w.write_f32(pos[0].to_float() as f32);
            w.write_f32(pos[1].to_float() as f32);
            w.write_f32(pos[2].to_float() as f32);
        }
        if fix_flags.contains(PlayerFlags::FIX_MOM) {
            plr.fix_counter.mom += 1;
            w.write_i32(plr.fix_counter.mom);
            w.write_f32(mom[0].to_float() as f32);
            w.write_f32(mom[1].to_float() as f32);
            w.write_f32(mom[2].to_float() as f32);
        }

        plr.flags
            .remove(PlayerFlags::FIX_ANGLES | PlayerFlags::FIX_ORIGIN | PlayerFlags::FIX_MOM);

        let packet = Packet::with_payload(0, PacketType::PsvPlayerFix, w.into_bytes());
        self.send(SendTarget::Broadcast, packet);

        // Fresh start for the smoothing buffer.
        self.players[console as usize].smoother.clear();
    }

    /// Server-side per-tick work: advance smoothing, apply smoothed
    /// client positions, snapshot sharp-tick angles, emit fixes.
    pub fn ticker(&mut self, world: &mut World, tick_seconds: f32) {
        self.game_time += tick_seconds;

        for console in 0..MAX_PLAYERS as u8 {
            let (in_game, mobj_id) = {
                let plr = &self.players[console as usize].player;
                (plr.in_game, plr.mobj)
            };
            let Some(mobj_id) = mobj_id else { continue };
            if !in_game {
                continue;
            }

            if let Some(point) = self.players[console as usize]
                .smoother
                .advance(tick_seconds)
            {
                if let Some(th) = world.thinkers.get_mut(mobj_id) {
                    if let ThinkerKind::Mobj(m) = &mut th.kind {
                        m.pos[0] = Fixed::from_float(point.pos[0]);
                        m.pos[1] = Fixed::from_float(point.pos[1]);
                        m.pos[2] = if point.on_floor {
                            m.floor_z
                        } else {
                            Fixed::from_float(point.pos[2])
                        };
                    }
                }
            }

            if world.thinkers.is_sharp_tick() {
                if let Some(th) = world.thinkers.get_mut(mobj_id) {
                    if let ThinkerKind::Mobj(m) = &mut th.kind {
                        m.last_angle = m.angle;
                        self.players[console as usize].player.last_angle = m.angle;
                    }
                }
            }

            // Fix packets are retransmitted until the ack counter
            // catches up; every resend carries a fresh counter.
            {
                let plr = &mut self.players[console as usize];
                let unacked = plr.player.fix_acked != plr.player.fix_counter;
                if unacked && plr.player.flags.intersection(
                    PlayerFlags::FIX_ANGLES | PlayerFlags::FIX_ORIGIN | PlayerFlags::FIX_MOM,
                ).is_empty()
                {
                    plr.fix_resend -= 1;
                    if plr.fix_resend <= 0 {
                        plr.fix_resend = crate::constants::tick::TICRATE as i32;
                        if plr.player.fix_acked.angles != plr.player.fix_counter.angles {
                            plr.player.flags.insert(PlayerFlags::FIX_ANGLES);
                        }
                        if plr.player.fix_acked.origin != plr.player.fix_counter.origin {
                            plr.player.flags.insert(PlayerFlags::FIX_ORIGIN);
                        }
                        if plr.player.fix_acked.mom != plr.player.fix_counter.mom {
                            plr.player.flags.insert(PlayerFlags::FIX_MOM);
                        }
                    }
                }
            }

            self.send_player_fixes(console, world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::map::Map;

    fn world() -> World {
        World::new(Map::empty("MAP01"))
    }

    fn hello2_payload(id: u32, game_id: &str) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(id);
        w.write_padded(game_id, 16);
        w.into_bytes()
    }

    fn connect(session: &mut ServerSession, world: &mut World, node: u32, id: u32) -> u8 {
        let console = session.player_arrives(node, "player").unwrap();
        let tx = session.ingest_sender();
        tx.send(Packet::with_payload(
            console,
            PacketType::PclHello2,
            hello2_payload(id, &session.game_id.clone()),
        ))
        .unwrap();
        session.get_packets(world, 0);
        console
    }

    fn outbox_types(session: &ServerSession) -> Vec<PacketType> {
        session.outbox.iter().map(|(_, p)| p.ty).collect()
    }

    #[test]
    fn test_handshake_sequence_and_sync() {
        let mut session = ServerSession::new("ember-demo", "");
        let mut world = world();
        session.game_time = 12.5;

        let console = connect(&mut session, &mut world, 77, 0xAB);
        let types = outbox_types(&session);
        assert!(types.contains(&PacketType::PsvHandshake));
        assert!(types.contains(&PacketType::PsvMaterialArchive));
        assert!(types.contains(&PacketType::PsvMobjTypeIdList));
        assert!(types.contains(&PacketType::PsvMobjStateIdList));
        // No sync until the client says OK.
        assert!(!types.contains(&PacketType::PsvSync));

        session
            .ingest_sender()
            .send(Packet::new(console, PacketType::PktOk))
            .unwrap();
        session.get_packets(&mut world, 0);

        let sync = session
            .outbox
            .iter()
            .find(|(_, p)| p.ty == PacketType::PsvSync)
            .expect("sync sent after OK");
        let time = sync.1.reader().read_f32().unwrap();
        assert_eq!(time, 12.5);
    }

    #[test]
    fn test_duplicate_id_refused() {
        let mut session = ServerSession::new("ember-demo", "");
        let mut world = world();

        let first = connect(&mut session, &mut world, 77, 0xAB);
        assert!(session.players[first as usize].player.in_game);

        let second = connect(&mut session, &mut world, 78, 0xAB);
        // Kicked: slot freed, close packet sent.
        assert!(!session.players[second as usize].is_connected());
        assert!(outbox_types(&session).contains(&PacketType::PsvServerClose));
    }

    #[test]
    fn test_bad_game_id_refused() {
        let mut session = ServerSession::new("ember-demo", "");
        let mut world = world();

        let console = session.player_arrives(5, "bad").unwrap();
        session
            .ingest_sender()
            .send(Packet::with_payload(
                console,
                PacketType::PclHello2,
                hello2_payload(1, "other-game"),
            ))
            .unwrap();
        session.get_packets(&mut world, 0);
        assert!(!session.players[console as usize].is_connected());
    }

    #[test]
    fn test_coords_gated_on_fix_ack() {
        // Scenario: a pending origin fix makes the server distrust the
        // client's coordinates until the counter is acked.
        let mut session = ServerSession::new("ember-demo", "");
        let mut world = world();
        let console = connect(&mut session, &mut world, 77, 0xAB);

        // Give the player a mobj.
        world.mobj_info.push(Default::default());
        let mobj = world
            .spawn_mobj(0, Fixed::ZERO, Fixed::ZERO, Fixed::ZERO, 0)
            .unwrap();
        session.players[console as usize].player.mobj = Some(mobj);

        // The handshake raised FIX_* flags; emit the fix (counter 1).
        session.send_player_fixes(console, &world);
        assert_eq!(
            session.players[console as usize].player.fix_counter.origin,
            1
        );
        assert!(!session.can_trust_client_pos(console));

        // Client coords before acking: discarded.
        let mut w = Writer::new();
        w.write_f32(1.0); // client time
        w.write_f32(16.0);
        w.write_f32(16.0);
        w.write_i32(0);
        w.write_u16(0);
        w.write_i16(0);
        w.write_i8(0);
        w.write_i8(0);
        let coords = w.into_bytes();
        session
            .ingest_sender()
            .send(Packet::with_payload(
                console,
                PacketType::PktCoords,
                coords.clone(),
            ))
            .unwrap();
        session.get_packets(&mut world, 0);
        assert!(session.players[console as usize].smoother.is_empty());

        // Ack the counters; now coordinates are admitted.
        let mut w = Writer::new();
        w.write_i32(1); // angles
        w.write_i32(1); // origin
        w.write_i32(1); // mom
        session
            .ingest_sender()
            .send(Packet::with_payload(
                console,
                PacketType::PclAckPlayerFix,
                w.into_bytes(),
            ))
            .unwrap();
        session.get_packets(&mut world, 0);
        assert!(session.can_trust_client_pos(console));

        session
            .ingest_sender()
            .send(Packet::with_payload(console, PacketType::PktCoords, coords))
            .unwrap();
        session.get_packets(&mut world, 0);
        assert!(!session.players[console as usize].smoother.is_empty());
    }

    #[test]
    fn test_warp_discrepancy_forces_new_fix() {
        let mut session = ServerSession::new("ember-demo", "");
        let mut world = world();
        let console = connect(&mut session, &mut world, 77, 0xAB);

        world.mobj_info.push(Default::default());
        let mobj = world
            .spawn_mobj(0, Fixed::ZERO, Fixed::ZERO, Fixed::ZERO, 0)
            .unwrap();
        session.players[console as usize].player.mobj = Some(mobj);

        session.send_player_fixes(console, &world);
        // Ack everything so coords are trusted again.
        session.players[console as usize].player.fix_acked =
            session.players[console as usize].player.fix_counter;

        // Report a position 1000 units away.
        let mut w = Writer::new();
        w.write_f32(1.0);
        w.write_f32(1000.0);
        w.write_f32(0.0);
        w.write_i32(0);
        w.write_u16(0);
        w.write_i16(0);
        w.write_i8(0);
        w.write_i8(0);
        session
            .ingest_sender()
            .send(Packet::with_payload(
                console,
                PacketType::PktCoords,
                w.into_bytes(),
            ))
            .unwrap();
        session.get_packets(&mut world, 0);

        // Not admitted; a new origin fix is pending instead.
        assert!(session.players[console as usize].smoother.is_empty());
        assert!(session.players[console as usize]
            .player
            .flags
            .contains(PlayerFlags::FIX_ORIGIN));
    }

    #[test]
    fn test_login_and_remote_command() {
        let mut session = ServerSession::new("ember-demo", "hunter2");
        let mut world = world();
        let console = connect(&mut session, &mut world, 77, 0xAB);

        // Wrong password first.
        let mut w = Writer::new();
        w.write_u8(5);
        w.write_bytes(b"wrong");
        session
            .ingest_sender()
            .send(Packet::with_payload(console, PacketType::PktLogin, w.into_bytes()))
            .unwrap();
        session.get_packets(&mut world, 0);
        assert!(session.remote_user.is_none());

        // Correct password.
        let mut w = Writer::new();
        w.write_u8(7);
        w.write_bytes(b"hunter2");
        session
            .ingest_sender()
            .send(Packet::with_payload(console, PacketType::PktLogin, w.into_bytes()))
            .unwrap();
        session.get_packets(&mut world, 0);
        assert_eq!(session.remote_user, Some(console));

        // Now a remote command is accepted.
        let mut w = Writer::new();
        let cmd = b"listmaps";
        w.write_u16(cmd.len() as u16);
        w.write_u16(0); // flags
        w.write_u8(0); // source
        w.write_bytes(cmd);
        session
            .ingest_sender()
            .send(Packet::with_payload(
                console,
                PacketType::PktCommand2,
                w.into_bytes(),
            ))
            .unwrap();
        session.get_packets(&mut world, 0);
        assert_eq!(session.pending_commands, vec!["listmaps".to_string()]);

        // Logout sends the negative login response.
        assert!(session.logout());
        assert!(session.remote_user.is_none());
    }

    #[test]
    fn test_player_exit_broadcast() {
        let mut session = ServerSession::new("ember-demo", "");
        let mut world = world();
        let console = connect(&mut session, &mut world, 77, 0xAB);
        session.outbox.clear();

        session.player_leaves(77);
        let exit = session
            .outbox
            .iter()
            .find(|(t, p)| *t == SendTarget::Broadcast && p.ty == PacketType::PsvPlayerExit)
            .expect("exit broadcast");
        assert_eq!(exit.1.payload[0], console);
    }
}
