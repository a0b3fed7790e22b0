//! Inbound dispatch: one command, one resolved action, at most one reply.
//!
//! Error taxonomy at this boundary:
//!   - not found                -> `NotFound`, no reply
//!   - trust check failed       -> `Dropped`, no reply
//!   - model or store not ready -> `Pending`, caller re-issues
//!   - anything else            -> logged, answered with one NMI_ERROR reply
//!
//! Update and delete commands for descriptors owned by another engine are
//! relayed to that engine. The relay bumps `hops`; once `hops` reaches
//! `max_forward_hops` the command is dropped instead of relayed again.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;

use mesh_ui_model::{Descriptor, DescriptorKind, Record};

use crate::collaborators::{
    AccessControl, EngineHandle, Localizer, MemoryResources, NoPickers, PassthroughLocalizer,
    PickerEntry, PickerSource, ResourceProvider, UserLevels,
};
use crate::command::{
    decode_assignments, opcode, DataSubVerb, RoutedCommand, FIELD_SEPARATOR, RETRIEVED_SUFFIX,
};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::readiness::ReadinessGate;
use crate::registry::MeshRegistry;
use crate::screen::ScreenAssembler;
use crate::store::{DataStore, StoreOutcome, StoreRegistry};
use crate::transport::Transport;

/// Text of the user-visible error reply, before localization.
pub const ERROR_MESSAGE: &str = "The request could not be completed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotRunning,
    NotFirstNode,
    AccessDenied,
    ForwardLimit,
    UnknownOpcode,
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Replied,
    /// Relayed to the named owner engine.
    Forwarded(String),
    Dropped(DropReason),
    Pending,
    NotFound,
    Failed,
}

/// Payload of a row reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowPage {
    pub descriptor_id: String,
    pub total: usize,
    pub page: usize,
    pub rows: Vec<BTreeMap<String, String>>,
}

pub struct Dispatcher {
    config: SyncConfig,
    registry: Arc<MeshRegistry>,
    stores: Arc<StoreRegistry>,
    gate: Arc<ReadinessGate>,
    transport: Arc<dyn Transport>,
    access: Arc<dyn AccessControl>,
    localizer: Arc<dyn Localizer>,
    pickers: Arc<dyn PickerSource>,
    resources: Arc<dyn ResourceProvider>,
    dashboard_panel: Option<String>,
}

impl Dispatcher {
    pub fn new(
        config: SyncConfig,
        registry: Arc<MeshRegistry>,
        stores: Arc<StoreRegistry>,
        gate: Arc<ReadinessGate>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            registry,
            stores,
            gate,
            transport,
            access: Arc::new(UserLevels::new()),
            localizer: Arc::new(PassthroughLocalizer),
            pickers: Arc::new(NoPickers),
            resources: Arc::new(MemoryResources::new()),
            dashboard_panel: None,
        }
    }

    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn with_pickers(mut self, pickers: Arc<dyn PickerSource>) -> Self {
        self.pickers = pickers;
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = resources;
        self
    }

    /// Dashboard whose panels this engine contributes to assembled screens.
    pub fn with_dashboard_panel(mut self, dashboard_id: &str) -> Self {
        self.dashboard_panel = Some(dashboard_id.to_string());
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn dispatch(&self, command: &RoutedCommand) -> DispatchOutcome {
        if !self.registry.is_running() {
            return DispatchOutcome::Dropped(DropReason::NotRunning);
        }

        let result = match command.base_opcode() {
            opcode::GET_DATA => {
                self.registry.note_node(&command.origin);
                match command.sub_verb() {
                    None => self.get_rows(command),
                    Some(raw) => match DataSubVerb::parse(raw) {
                        Some(verb) => self.get_picker(command, verb),
                        None => Ok(self.reject(command, DropReason::UnknownOpcode)),
                    },
                }
            }
            opcode::GET_SCREEN => {
                self.registry.note_node(&command.origin);
                self.get_screen(command)
            }
            opcode::GET_RESOURCE => {
                self.registry.note_node(&command.origin);
                self.get_resource(command)
            }
            opcode::UPDATE_DATA => self.update_record(command),
            opcode::DELETE_ID => self.delete_record(command),
            _ => Ok(self.reject(command, DropReason::UnknownOpcode)),
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => self.fail(command, err),
        }
    }

    // ── Reads ─────────────────────────────────────────────────────

    fn get_rows(&self, command: &RoutedCommand) -> SyncResult<DispatchOutcome> {
        if !command.is_first_node() {
            return Ok(self.reject(command, DropReason::NotFirstNode));
        }
        if !self.gate.is_ready() {
            return Ok(DispatchOutcome::Pending);
        }
        let Some(descriptor) = self.stores.find_descriptor(command.body.trim()) else {
            return Ok(DispatchOutcome::NotFound);
        };
        if !self.allowed(command, descriptor.access_level) {
            return Ok(self.reject(command, DropReason::AccessDenied));
        }
        let Some(source) = descriptor.data_source.as_ref() else {
            return Ok(DispatchOutcome::NotFound);
        };
        let Some(store) = self.stores.data_store(&source.source_kind) else {
            debug!("no data store for {}", source.source_kind);
            return Ok(DispatchOutcome::NotFound);
        };
        if !store.is_ready() {
            return Ok(DispatchOutcome::Pending);
        }

        let selection = source.select(store.all());
        let page = RowPage {
            descriptor_id: descriptor.id.clone(),
            total: selection.total,
            page: selection.page,
            rows: selection.records.iter().map(Record::to_row).collect(),
        };
        let payload = serde_json::to_vec(&page)?;
        self.reply(command, opcode::SET_DATA, &descriptor.id, payload);
        Ok(DispatchOutcome::Replied)
    }

    fn get_picker(&self, command: &RoutedCommand, verb: DataSubVerb) -> SyncResult<DispatchOutcome> {
        if !command.is_first_node() {
            return Ok(self.reject(command, DropReason::NotFirstNode));
        }
        if !self.allowed(command, self.config.picker_access_level) {
            return Ok(self.reject(command, DropReason::AccessDenied));
        }

        let arg = command.body.trim();
        let entries: Vec<PickerEntry> = match verb {
            DataSubVerb::Thing => self.pickers.things(arg),
            DataSubVerb::DeviceType => self.pickers.device_types(),
            DataSubVerb::Property => self.pickers.properties(arg),
            DataSubVerb::Certificate => self.pickers.certificates(),
            DataSubVerb::Resolve => {
                return Ok(match self.pickers.resolve_name(arg) {
                    Some(name) => {
                        let body = format!("{}:{}", arg, name);
                        self.reply(command, opcode::SET_DATA, &body, Vec::new());
                        DispatchOutcome::Replied
                    }
                    None => DispatchOutcome::NotFound,
                });
            }
        };
        let payload = serde_json::to_vec(&entries)?;
        self.reply(command, opcode::SET_DATA, arg, payload);
        Ok(DispatchOutcome::Replied)
    }

    fn get_screen(&self, command: &RoutedCommand) -> SyncResult<DispatchOutcome> {
        if !command.is_first_node() {
            return Ok(self.reject(command, DropReason::NotFirstNode));
        }
        if !self.gate.is_ready() {
            return Ok(DispatchOutcome::Pending);
        }
        let dashboard_id = command.body.trim();
        let Some(dashboard) = self.stores.descriptor(DescriptorKind::Dashboard, dashboard_id) else {
            return Ok(DispatchOutcome::NotFound);
        };
        if !self.allowed(command, dashboard.access_level) {
            return Ok(self.reject(command, DropReason::AccessDenied));
        }

        let assembler = ScreenAssembler {
            stores: &self.stores,
            registry: &self.registry,
            access: self.access.as_ref(),
            localizer: self.localizer.as_ref(),
            engine_name: &self.config.engine_name,
            default_lcid: self.config.default_lcid,
        };
        let Some(view) = assembler.assemble(dashboard_id, &command.context) else {
            return Ok(DispatchOutcome::NotFound);
        };
        let payload = serde_json::to_vec(&view)?;
        self.reply(command, opcode::SET_SCREEN, dashboard_id, payload);
        Ok(DispatchOutcome::Replied)
    }

    fn get_resource(&self, command: &RoutedCommand) -> SyncResult<DispatchOutcome> {
        if !command.is_first_node() {
            return Ok(self.reject(command, DropReason::NotFirstNode));
        }
        if !self.allowed(command, self.config.resource_access_level) {
            return Ok(self.reject(command, DropReason::AccessDenied));
        }
        let name = command.body.trim();
        Ok(match self.resources.resource(name) {
            Some(bytes) => {
                self.reply(command, opcode::SET_RESOURCE, name, bytes);
                DispatchOutcome::Replied
            }
            None => DispatchOutcome::NotFound,
        })
    }

    // ── Mutations ─────────────────────────────────────────────────

    fn update_record(&self, command: &RoutedCommand) -> SyncResult<DispatchOutcome> {
        let fields = command.fields();
        if fields.len() < 3 {
            return Ok(self.reject(command, DropReason::Malformed));
        }
        let (descriptor_id, record_id) = (fields[0].trim(), fields[1].trim());
        let Ok(assignments) = decode_assignments(&fields[2..]) else {
            return Ok(self.reject(command, DropReason::Malformed));
        };
        if record_id.is_empty() || assignments.is_empty() {
            return Ok(self.reject(command, DropReason::Malformed));
        }

        if !self.gate.is_ready() {
            return Ok(DispatchOutcome::Pending);
        }
        let Some(descriptor) = self.stores.find_descriptor(descriptor_id) else {
            return Ok(DispatchOutcome::NotFound);
        };
        if let Some(owner) = self.foreign_owner(&descriptor) {
            return Ok(self.forward(command, owner));
        }
        if !self.allowed(command, descriptor.access_level) {
            return Ok(self.reject(command, DropReason::AccessDenied));
        }
        let Some(store) = self.data_store_for(&descriptor) else {
            return Ok(DispatchOutcome::NotFound);
        };
        if !store.is_ready() {
            debug!("{} not loaded; deferring {}", store.signal_name(), command.opcode);
            return Ok(DispatchOutcome::Pending);
        }

        let outcome = match store.get_by_id(record_id) {
            Some(record) => {
                for (name, value) in &assignments {
                    record.fields.set(name, value, false);
                }
                store.update(record)?
            }
            None => {
                let record = Record::new(record_id);
                for (name, value) in &assignments {
                    record.fields.set(name, value, false);
                }
                store.add(record)?
            }
        };
        self.finish_mutation(command, &descriptor, record_id, opcode::UPDATE_DATA_RET, outcome)
    }

    fn delete_record(&self, command: &RoutedCommand) -> SyncResult<DispatchOutcome> {
        let fields = command.fields();
        if fields.len() != 2 {
            return Ok(self.reject(command, DropReason::Malformed));
        }
        let (descriptor_id, record_id) = (fields[0].trim(), fields[1].trim());
        if record_id.is_empty() {
            return Ok(self.reject(command, DropReason::Malformed));
        }

        if !self.gate.is_ready() {
            return Ok(DispatchOutcome::Pending);
        }
        let Some(descriptor) = self.stores.find_descriptor(descriptor_id) else {
            return Ok(DispatchOutcome::NotFound);
        };
        if let Some(owner) = self.foreign_owner(&descriptor) {
            return Ok(self.forward(command, owner));
        }
        if !self.allowed(command, descriptor.access_level) {
            return Ok(self.reject(command, DropReason::AccessDenied));
        }
        let Some(store) = self.data_store_for(&descriptor) else {
            return Ok(DispatchOutcome::NotFound);
        };
        if !store.is_ready() {
            debug!("{} not loaded; deferring {}", store.signal_name(), command.opcode);
            return Ok(DispatchOutcome::Pending);
        }

        let outcome = store.remove(record_id)?;
        self.finish_mutation(command, &descriptor, record_id, opcode::DELETE_ID_RET, outcome)
    }

    fn finish_mutation(
        &self,
        command: &RoutedCommand,
        descriptor: &Descriptor,
        record_id: &str,
        reply_opcode: &str,
        outcome: StoreOutcome,
    ) -> SyncResult<DispatchOutcome> {
        match outcome {
            StoreOutcome::Pending => Ok(DispatchOutcome::Pending),
            StoreOutcome::Missing => Ok(DispatchOutcome::NotFound),
            StoreOutcome::Applied => {
                let body = format!("{}:{}", descriptor.id, record_id);
                self.reply(command, reply_opcode, &body, Vec::new());
                self.notify_retrieved(descriptor, record_id);
                Ok(DispatchOutcome::Replied)
            }
        }
    }

    /// Tell every other descriptor reading the same source to refresh.
    fn notify_retrieved(&self, descriptor: &Descriptor, record_id: &str) {
        if !self.config.may_broadcast() {
            debug!("retrieved fan-out for {} suppressed", descriptor.id);
            return;
        }
        let peers = self
            .stores
            .query_descriptors(&|d| d.id != descriptor.id && d.shares_source_with(descriptor));
        for peer in peers {
            let mut notice = RoutedCommand::new(opcode::REFRESH, record_id)
                .with_topic(&format!("{}{}", peer.id, RETRIEVED_SUFFIX))
                .with_origin(self.registry.node_id());
            notice.no_duplicates = true;
            notice.nodes_only = true;
            self.transport.publish_broadcast(notice);
        }
    }

    // ── Forwarding ────────────────────────────────────────────────

    fn foreign_owner<'d>(&self, descriptor: &'d Descriptor) -> Option<&'d str> {
        let owner = descriptor.owner_engine.as_str();
        (!owner.is_empty() && owner != self.config.engine_name).then_some(owner)
    }

    fn forward(&self, command: &RoutedCommand, engine_name: &str) -> DispatchOutcome {
        if command.hops >= self.config.max_forward_hops {
            warn!(
                "{} for engine {} dropped after {} hops",
                command.opcode, engine_name, command.hops
            );
            return DispatchOutcome::Dropped(DropReason::ForwardLimit);
        }
        let Some(engine) = self.registry.engine(engine_name) else {
            warn!("{}: owner engine {} not registered", command.opcode, engine_name);
            return DispatchOutcome::NotFound;
        };
        info!(
            "forwarding {} from {} to {}",
            command.opcode, self.config.engine_name, engine_name
        );
        engine.handle_command(command.relayed());
        DispatchOutcome::Forwarded(engine_name.to_string())
    }

    // ── Helpers ───────────────────────────────────────────────────

    fn data_store_for(&self, descriptor: &Descriptor) -> Option<Arc<DataStore>> {
        let source = descriptor.data_source.as_ref()?;
        self.stores.data_store(&source.source_kind)
    }

    fn allowed(&self, command: &RoutedCommand, level: u32) -> bool {
        self.access.has_access(&command.context.user_id, level)
    }

    fn reject(&self, command: &RoutedCommand, reason: DropReason) -> DispatchOutcome {
        debug!(
            "dropped {} from {:?}: {:?}",
            command.opcode, command.origin, reason
        );
        DispatchOutcome::Dropped(reason)
    }

    fn reply(&self, command: &RoutedCommand, reply_opcode: &str, body: &str, payload: Vec<u8>) {
        let reply = command
            .reply(reply_opcode, body, self.registry.node_id())
            .with_payload(payload);
        self.transport.publish_to_node(&command.origin, reply);
    }

    fn fail(&self, command: &RoutedCommand, err: SyncError) -> DispatchOutcome {
        error!(
            "{} from {:?} failed: {}",
            command.opcode, command.origin, err
        );
        let lcid = match command.context.lcid {
            0 => self.config.default_lcid,
            lcid => lcid,
        };
        let text = self
            .localizer
            .localize(lcid, &self.config.engine_name, ERROR_MESSAGE);
        self.reply(command, opcode::ERROR, &text, Vec::new());
        DispatchOutcome::Failed
    }
}

impl EngineHandle for Dispatcher {
    fn name(&self) -> &str {
        &self.config.engine_name
    }

    fn dashboard_panel(&self) -> Option<String> {
        self.dashboard_panel.clone()
    }

    fn handle_command(&self, command: RoutedCommand) {
        let outcome = self.dispatch(&command);
        debug!("{} handled {}: {:?}", self.config.engine_name, command.opcode, outcome);
    }
}

/// Body of an update command, for callers building one.
pub fn update_body(descriptor_id: &str, record_id: &str, assignments: &str) -> String {
    [descriptor_id, record_id, assignments].join(FIELD_SEPARATOR)
}
