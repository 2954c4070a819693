use crate::category::{Category, ItemAction};
use crate::dataset::{Dataset, RegionalKind, RegionalOverrides, TenancyOverrides};
use crate::export;
use crate::input::Action;
use crate::model::{
    BaseModel, DedicatedAiCluster, Environment, GpuNode, GpuPool, ModelArtifact,
};
use crate::rows::{
    self, ItemKey, ItemRef, Row, ScopeContext, ScopedItemKey, SortState, item_key,
    item_key_string,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Edit,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EditTarget {
    None,
    Filter,
    Alias,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ViewMode {
    List,
    Details,
    Help,
    Loading,
    Export,
    Error,
}

/// Data a category needs beyond the initial snapshot.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LoadRequest {
    Dataset,
    BaseModels,
    GpuPools,
    GpuNodes,
    DedicatedAiClusters,
    TenancyOverrides,
    ModelArtifacts,
    RegionalOverrides(RegionalKind),
}

impl LoadRequest {
    pub fn for_category(category: Category) -> Self {
        match category {
            Category::BaseModel => Self::BaseModels,
            Category::GpuPool => Self::GpuPools,
            Category::GpuNode => Self::GpuNodes,
            Category::DedicatedAICluster => Self::DedicatedAiClusters,
            Category::ModelArtifact => Self::ModelArtifacts,
            Category::Tenant
            | Category::LimitTenancyOverride
            | Category::ConsolePropertyTenancyOverride
            | Category::PropertyTenancyOverride => Self::TenancyOverrides,
            Category::LimitRegionalOverride
            | Category::ConsolePropertyRegionalOverride
            | Category::PropertyRegionalOverride => RegionalKind::from_category(category)
                .map(Self::RegionalOverrides)
                .unwrap_or(Self::Dataset),
            Category::LimitDefinition
            | Category::ConsolePropertyDefinition
            | Category::PropertyDefinition
            | Category::Environment
            | Category::ServiceTenancy
            | Category::Alias => Self::Dataset,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::BaseModels => "base models",
            Self::GpuPools => "GPU pools",
            Self::GpuNodes => "GPU nodes",
            Self::DedicatedAiClusters => "dedicated AI clusters",
            Self::TenancyOverrides => "tenancy overrides",
            Self::ModelArtifacts => "model artifacts",
            Self::RegionalOverrides(kind) => match kind {
                RegionalKind::Limit => "limit regional overrides",
                RegionalKind::ConsoleProperty => "console property regional overrides",
                RegionalKind::Property => "property regional overrides",
            },
        }
    }
}

/// Mutable node fields restored when an action fails.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NodeSnapshot {
    pub status: Option<String>,
    pub is_cordoned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    None,
    Load {
        request: LoadRequest,
        env: Environment,
        generation: u64,
    },
    ChangeEnvironment {
        env: Environment,
        generation: u64,
    },
    ScheduleFilterTick {
        text: String,
    },
    CopyToClipboard {
        text: String,
    },
    ReadClipboard,
    ListDirectory {
        dir: PathBuf,
    },
    WriteCsv {
        path: PathBuf,
        headers: Vec<String>,
        rows: Vec<Row>,
    },
    DeleteDac {
        env: Environment,
        generation: u64,
        bucket: String,
        dac: DedicatedAiCluster,
        previous_status: String,
    },
    SetCordon {
        env: Environment,
        generation: u64,
        node: GpuNode,
        cordon: bool,
        previous: NodeSnapshot,
    },
    Drain {
        env: Environment,
        generation: u64,
        node: GpuNode,
        previous: NodeSnapshot,
    },
    Reboot {
        env: Environment,
        generation: u64,
        node: GpuNode,
        previous: NodeSnapshot,
    },
    ScalePool {
        env: Environment,
        generation: u64,
        pool: GpuPool,
        size: i64,
        previous: i64,
    },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoadFailure {
    pub request: LoadRequest,
    pub generation: u64,
    pub message: String,
}

/// Results posted back to the loop by dispatched commands, plus timer input.
#[derive(Debug)]
pub enum Message {
    DatasetLoaded {
        dataset: Box<Dataset>,
        generation: u64,
    },
    BaseModelsLoaded {
        items: Vec<BaseModel>,
        generation: u64,
    },
    GpuPoolsLoaded {
        items: Vec<GpuPool>,
        generation: u64,
    },
    GpuNodesLoaded {
        items: BTreeMap<String, Vec<GpuNode>>,
        generation: u64,
    },
    DedicatedAiClustersLoaded {
        items: BTreeMap<String, Vec<DedicatedAiCluster>>,
        generation: u64,
    },
    TenancyOverridesLoaded {
        overrides: TenancyOverrides,
        generation: u64,
    },
    ModelArtifactsLoaded {
        items: Vec<ModelArtifact>,
        generation: u64,
    },
    RegionalOverridesLoaded {
        overrides: RegionalOverrides,
        generation: u64,
    },
    DeleteDone {
        bucket: String,
        name: String,
        generation: u64,
    },
    DeleteErr {
        generation: u64,
        bucket: String,
        name: String,
        previous_status: String,
        error: String,
    },
    CordonResult {
        generation: u64,
        pool: String,
        name: String,
        cordon: bool,
        previous: NodeSnapshot,
        result: Result<(), String>,
    },
    DrainResult {
        generation: u64,
        pool: String,
        name: String,
        previous: NodeSnapshot,
        result: Result<(), String>,
    },
    RebootResult {
        generation: u64,
        pool: String,
        name: String,
        previous: NodeSnapshot,
        result: Result<(), String>,
    },
    GpuPoolScaleStarted {
        generation: u64,
        name: String,
        size: i64,
    },
    GpuPoolScaleResult {
        generation: u64,
        name: String,
        size: i64,
        previous: i64,
        result: Result<(), String>,
    },
    DirectoryListed {
        dir: PathBuf,
        result: Result<Vec<String>, String>,
    },
    ExportWritten {
        result: Result<PathBuf, String>,
    },
    SetFilter(String),
    FilterTick(String),
    Notice(String),
    WindowSize(u16, u16),
    Tick,
    Err(LoadFailure),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct PendingConfirmation {
    action: ItemAction,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ExportState {
    pub dir: PathBuf,
    pub entries: Vec<String>,
    pub selected: usize,
}

pub struct App {
    running: bool,
    category: Category,
    scope: Option<ScopeContext>,
    filter: String,
    new_filter: String,
    filter_before_edit: String,
    input: String,
    input_mode: InputMode,
    edit_target: EditTarget,
    view_mode: ViewMode,
    last_view_mode: ViewMode,
    dataset: Dataset,
    rows: Vec<Row>,
    selected: usize,
    chosen: Option<ItemKey>,
    sort: Option<SortState>,
    faulty_only: bool,
    history: Vec<Category>,
    history_idx: usize,
    pending_tasks: usize,
    generation: u64,
    env_generation: u64,
    pending_confirmation: Option<PendingConfirmation>,
    export: ExportState,
    detail_scroll: u16,
    page_size: usize,
    spinner: usize,
    status: String,
    err: Option<String>,
}

impl App {
    pub fn new(dataset: Dataset, category: Category, filter: &str, export_dir: PathBuf) -> Self {
        let filter = filter.trim().to_lowercase();
        let mut app = Self {
            running: true,
            category,
            scope: None,
            new_filter: filter.clone(),
            filter_before_edit: filter.clone(),
            filter,
            input: String::new(),
            input_mode: InputMode::Normal,
            edit_target: EditTarget::None,
            view_mode: ViewMode::List,
            last_view_mode: ViewMode::List,
            dataset,
            rows: Vec::new(),
            selected: 0,
            chosen: None,
            sort: None,
            faulty_only: false,
            history: Vec::new(),
            history_idx: 0,
            pending_tasks: 0,
            generation: 0,
            env_generation: 0,
            pending_confirmation: None,
            export: ExportState {
                dir: export_dir,
                ..ExportState::default()
            },
            detail_scroll: 0,
            page_size: 10,
            spinner: 0,
            status: "Ready".to_string(),
            err: None,
        };
        app.refresh_rows();
        app
    }

    /// Kicks off the lazy load the starting category needs, if any.
    pub fn start(&mut self) -> AppCommand {
        self.ensure_data()
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn scope(&self) -> Option<&ScopeContext> {
        self.scope.as_ref()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn edit_target(&self) -> EditTarget {
        self.edit_target
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.dataset.environment.as_ref()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn selected_index(&self) -> Option<usize> {
        (!self.rows.is_empty()).then_some(self.selected)
    }

    pub fn sort(&self) -> Option<SortState> {
        self.sort
    }

    pub fn faulty_only(&self) -> bool {
        self.faulty_only
    }

    pub fn history(&self) -> &[Category] {
        &self.history
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_tasks(&self) -> usize {
        self.pending_tasks
    }

    pub fn chosen(&self) -> Option<&ItemKey> {
        self.chosen.as_ref()
    }

    pub fn export_state(&self) -> &ExportState {
        &self.export
    }

    pub fn detail_scroll(&self) -> u16 {
        self.detail_scroll
    }

    pub fn spinner(&self) -> usize {
        self.spinner
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.err.as_deref()
    }

    pub fn pending_confirmation_prompt(&self) -> Option<String> {
        let pending = self.pending_confirmation?;
        let key = self.selected_key()?;
        Some(format!(
            "{} {}? (y/n)",
            pending.action.label(),
            item_key_string(&key)
        ))
    }

    pub fn headers(&self) -> Vec<String> {
        rows::header_texts(self.category)
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.rows.get(self.selected)
    }

    pub fn selected_key(&self) -> Option<ItemKey> {
        self.selected_row()
            .and_then(|row| item_key(self.category, row))
    }

    pub fn selected_item(&self) -> Option<ItemRef<'_>> {
        let key = self.selected_key()?;
        rows::find_item(&self.dataset, self.category, &key)
    }

    pub fn detail_json(&self) -> Value {
        self.selected_item()
            .map(|item| item.to_json())
            .unwrap_or(Value::Null)
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        let command = self.route_action(action);
        self.enforce_scope();
        command
    }

    fn route_action(&mut self, action: Action) -> AppCommand {
        if matches!(action, Action::Quit) {
            self.running = false;
            self.status = "Exit requested".to_string();
            return AppCommand::None;
        }

        match self.view_mode {
            ViewMode::List if self.input_mode == InputMode::Edit => self.apply_edit_action(action),
            ViewMode::List => self.apply_list_action(action),
            ViewMode::Details => self.apply_details_action(action),
            ViewMode::Help => {
                if matches!(action, Action::Back | Action::ToggleHelp) {
                    self.view_mode = self.last_view_mode;
                    self.status = "Help closed".to_string();
                }
                AppCommand::None
            }
            ViewMode::Export => self.apply_export_action(action),
            ViewMode::Error => {
                if matches!(action, Action::Back) {
                    self.err = None;
                    self.view_mode = ViewMode::List;
                    self.status = "Error dismissed".to_string();
                }
                AppCommand::None
            }
            ViewMode::Loading => AppCommand::None,
        }
    }

    fn apply_list_action(&mut self, action: Action) -> AppCommand {
        if let Some(pending) = self.pending_confirmation.take() {
            return match action {
                Action::ConfirmYes | Action::Enter => {
                    self.status = format!("Confirmed: {}", pending.action.label());
                    self.dispatch_item_action(pending.action)
                }
                Action::ConfirmNo | Action::CancelInput | Action::Back => {
                    self.status = "Action cancelled".to_string();
                    AppCommand::None
                }
                _ => {
                    self.pending_confirmation = Some(pending);
                    self.status =
                        "Pending confirmation: press y to confirm or n to cancel".to_string();
                    AppCommand::None
                }
            };
        }

        match action {
            Action::NextCategory => self.set_category(self.category.offset(1), true),
            Action::PrevCategory => self.set_category(self.category.offset(-1), true),
            Action::Down => {
                self.move_selection(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_selection(-1);
                AppCommand::None
            }
            Action::PageDown => {
                self.move_selection(self.page_size as isize);
                AppCommand::None
            }
            Action::PageUp => {
                self.move_selection(-(self.page_size as isize));
                AppCommand::None
            }
            Action::Top => {
                self.selected = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.selected = self.rows.len().saturating_sub(1);
                AppCommand::None
            }
            Action::Enter => self.enter_selected(),
            Action::Back => self.step_back(),
            Action::ShowDetails => {
                self.open_details();
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.last_view_mode = self.view_mode;
                self.view_mode = ViewMode::Help;
                self.status = "Help".to_string();
                AppCommand::None
            }
            Action::StartFilter => {
                self.input_mode = InputMode::Edit;
                self.edit_target = EditTarget::Filter;
                self.filter_before_edit = self.filter.clone();
                self.input = self.filter.clone();
                self.status = "Filter: type to narrow rows, Enter to keep, Esc to abort".to_string();
                AppCommand::None
            }
            Action::StartAlias => {
                self.input_mode = InputMode::Edit;
                self.edit_target = EditTarget::Alias;
                self.input.clear();
                self.status = "Category: type an alias, Tab to complete".to_string();
                AppCommand::None
            }
            Action::Refresh => self.refresh_category(),
            Action::ToggleFaulty => {
                self.faulty_only = !self.faulty_only;
                self.refresh_rows();
                self.status = if self.faulty_only {
                    "Showing faulty records only".to_string()
                } else {
                    "Showing all records".to_string()
                };
                AppCommand::None
            }
            Action::PasteFilter => {
                self.status = "Reading clipboard".to_string();
                AppCommand::ReadClipboard
            }
            Action::Sort(column) => {
                self.toggle_sort(column);
                AppCommand::None
            }
            Action::HistoryBack => self.move_history(-1),
            Action::HistoryForward => self.move_history(1),
            Action::StartExport => self.start_export(),
            Action::ConfirmYes => self.copy_selected(),
            Action::ConfirmNo => AppCommand::None,
            Action::Cordon => self.request_item_action(ItemAction::Cordon),
            Action::Drain => self.request_item_action(ItemAction::Drain),
            Action::Reboot => self.request_item_action(ItemAction::Reboot),
            Action::DeleteItem => self.request_item_action(ItemAction::Delete),
            Action::ScaleUp => self.request_item_action(ItemAction::ScaleUp),
            Action::ScaleDown => self.request_item_action(ItemAction::ScaleDown),
            _ => AppCommand::None,
        }
    }

    fn apply_edit_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::InputChar(c) => {
                self.input.push(c);
                self.input_changed()
            }
            Action::Backspace => {
                self.input.pop();
                self.input_changed()
            }
            Action::CompleteInput => {
                if self.edit_target == EditTarget::Alias
                    && let Some(alias) = complete_alias(&self.input)
                {
                    self.input = alias.to_string();
                }
                AppCommand::None
            }
            Action::SubmitInput => self.submit_input(),
            Action::CancelInput => {
                if self.edit_target == EditTarget::Filter {
                    self.filter = self.filter_before_edit.clone();
                    self.new_filter = self.filter.clone();
                    self.refresh_rows();
                }
                self.leave_edit();
                self.status = "Input cancelled".to_string();
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    fn input_changed(&mut self) -> AppCommand {
        if self.edit_target != EditTarget::Filter {
            return AppCommand::None;
        }
        self.new_filter = self.input.trim().to_lowercase();
        AppCommand::ScheduleFilterTick {
            text: self.new_filter.clone(),
        }
    }

    fn submit_input(&mut self) -> AppCommand {
        let target = self.edit_target;
        let input = self.input.trim().to_string();
        self.leave_edit();

        match target {
            EditTarget::Filter => {
                self.new_filter = input.to_lowercase();
                self.apply_filter(self.new_filter.clone());
                AppCommand::None
            }
            EditTarget::Alias => match Category::parse(&input) {
                Ok(category) => {
                    if category == self.category {
                        self.status = format!("Already on {category}");
                    }
                    self.set_category(category, true)
                }
                Err(error) => {
                    self.status = error.to_string();
                    AppCommand::None
                }
            },
            EditTarget::None => AppCommand::None,
        }
    }

    fn leave_edit(&mut self) {
        self.input_mode = InputMode::Normal;
        self.edit_target = EditTarget::None;
        self.input.clear();
    }

    fn apply_filter(&mut self, text: String) {
        if self.filter == text {
            return;
        }
        self.filter = text;
        self.refresh_rows();
        self.status = if self.filter.is_empty() {
            "Filter cleared".to_string()
        } else {
            format!("Filter: {}", self.filter)
        };
    }

    fn apply_details_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Back => {
                self.view_mode = ViewMode::List;
                self.status = "Details closed".to_string();
                AppCommand::None
            }
            Action::Down => {
                self.detail_scroll = self.detail_scroll.saturating_add(1);
                AppCommand::None
            }
            Action::Up => {
                self.detail_scroll = self.detail_scroll.saturating_sub(1);
                AppCommand::None
            }
            Action::PageDown => {
                self.detail_scroll = self.detail_scroll.saturating_add(self.page_size as u16);
                AppCommand::None
            }
            Action::PageUp => {
                self.detail_scroll = self.detail_scroll.saturating_sub(self.page_size as u16);
                AppCommand::None
            }
            Action::Top => {
                self.detail_scroll = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.detail_scroll = u16::MAX;
                AppCommand::None
            }
            Action::ConfirmYes => self.copy_selected(),
            _ => AppCommand::None,
        }
    }

    fn apply_export_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Back => {
                self.view_mode = ViewMode::List;
                self.status = "Export cancelled".to_string();
                AppCommand::None
            }
            Action::Down => {
                if self.export.selected + 1 < self.export.entries.len() {
                    self.export.selected += 1;
                }
                AppCommand::None
            }
            Action::Up => {
                self.export.selected = self.export.selected.saturating_sub(1);
                AppCommand::None
            }
            Action::Enter => match self.export.entries.get(self.export.selected) {
                Some(entry) => AppCommand::ListDirectory {
                    dir: self.export.dir.join(entry),
                },
                None => AppCommand::None,
            },
            Action::ParentDir => match self.export.dir.parent() {
                Some(parent) => AppCommand::ListDirectory {
                    dir: parent.to_path_buf(),
                },
                None => AppCommand::None,
            },
            Action::SaveExport => {
                let region = self
                    .environment()
                    .map(|env| env.region.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                let path = export::export_path(&self.export.dir, &region, self.category);
                self.status = format!("Writing {}", path.display());
                AppCommand::WriteCsv {
                    path,
                    headers: self.headers(),
                    rows: self.rows.clone(),
                }
            }
            _ => AppCommand::None,
        }
    }

    pub fn handle(&mut self, message: Message) -> AppCommand {
        let command = self.route_message(message);
        self.enforce_scope();
        command
    }

    fn route_message(&mut self, message: Message) -> AppCommand {
        match message {
            Message::DatasetLoaded {
                dataset,
                generation,
            } => {
                if !self.accept(generation, LoadRequest::Dataset) {
                    return AppCommand::None;
                }
                self.dataset = *dataset;
                if matches!(self.view_mode, ViewMode::Loading) {
                    self.view_mode = ViewMode::List;
                }
                self.err = None;
                self.status = match self.environment() {
                    Some(env) => format!("Loaded {env}"),
                    None => "Dataset loaded".to_string(),
                };
                self.refresh_rows();
                self.ensure_data()
            }
            Message::BaseModelsLoaded { items, generation } => {
                if self.accept(generation, LoadRequest::BaseModels) {
                    self.dataset.base_models = Some(items);
                    self.loaded(LoadRequest::BaseModels);
                }
                AppCommand::None
            }
            Message::GpuPoolsLoaded { items, generation } => {
                if self.accept(generation, LoadRequest::GpuPools) {
                    self.dataset.gpu_pools = Some(items);
                    self.loaded(LoadRequest::GpuPools);
                }
                AppCommand::None
            }
            Message::GpuNodesLoaded { items, generation } => {
                if self.accept(generation, LoadRequest::GpuNodes) {
                    self.dataset.gpu_nodes = Some(items);
                    self.loaded(LoadRequest::GpuNodes);
                }
                AppCommand::None
            }
            Message::DedicatedAiClustersLoaded { items, generation } => {
                if self.accept(generation, LoadRequest::DedicatedAiClusters) {
                    self.dataset.set_dedicated_ai_clusters(items);
                    self.loaded(LoadRequest::DedicatedAiClusters);
                }
                AppCommand::None
            }
            Message::TenancyOverridesLoaded {
                overrides,
                generation,
            } => {
                if self.accept(generation, LoadRequest::TenancyOverrides) {
                    self.dataset.set_tenancy_overrides(overrides);
                    self.loaded(LoadRequest::TenancyOverrides);
                }
                AppCommand::None
            }
            Message::ModelArtifactsLoaded { items, generation } => {
                if self.accept(generation, LoadRequest::ModelArtifacts) {
                    self.dataset.model_artifacts = items;
                    self.loaded(LoadRequest::ModelArtifacts);
                }
                AppCommand::None
            }
            Message::RegionalOverridesLoaded {
                overrides,
                generation,
            } => {
                let request = LoadRequest::RegionalOverrides(overrides.kind());
                if self.accept(generation, request) {
                    self.dataset.set_regional_overrides(overrides);
                    self.loaded(request);
                }
                AppCommand::None
            }
            Message::DeleteDone {
                bucket,
                name,
                generation,
            } => {
                if self.stale_action(generation, "delete") {
                    return AppCommand::None;
                }
                self.dataset.remove_dac(&bucket, &name);
                info!(bucket = %bucket, name = %name, "dedicated AI cluster deleted");
                self.status = format!("Deleted {bucket}/{name}");
                self.refresh_rows();
                AppCommand::None
            }
            Message::DeleteErr {
                generation,
                bucket,
                name,
                previous_status,
                error,
            } => {
                if self.stale_action(generation, "delete") {
                    return AppCommand::None;
                }
                if let Some(dac) = self.dataset.dac_mut(&bucket, &name) {
                    dac.status = previous_status;
                }
                warn!(bucket = %bucket, name = %name, error = %error, "delete failed");
                self.status = format!("Delete of {name} failed: {error}");
                self.refresh_rows();
                AppCommand::None
            }
            Message::CordonResult {
                generation,
                pool,
                name,
                cordon,
                previous,
                result,
            } => {
                if self.stale_action(generation, "cordon") {
                    return AppCommand::None;
                }
                let verb = if cordon { "cordon" } else { "uncordon" };
                self.finish_node_action(&pool, &name, verb, previous, result, |node| {
                    node.is_cordoned = cordon;
                });
                AppCommand::None
            }
            Message::DrainResult {
                generation,
                pool,
                name,
                previous,
                result,
            } => {
                if self.stale_action(generation, "drain") {
                    return AppCommand::None;
                }
                self.finish_node_action(&pool, &name, "drain", previous, result, |node| {
                    node.is_cordoned = true;
                });
                AppCommand::None
            }
            Message::RebootResult {
                generation,
                pool,
                name,
                previous,
                result,
            } => {
                if self.stale_action(generation, "reboot") {
                    return AppCommand::None;
                }
                self.finish_node_action(&pool, &name, "reboot", previous, result, |_| {});
                AppCommand::None
            }
            Message::GpuPoolScaleStarted {
                generation,
                name,
                size,
            } => {
                if self.stale_action(generation, "scale") {
                    return AppCommand::None;
                }
                debug!(pool = %name, size, "pool scale started");
                self.status = format!("Scaling {name} to {size}");
                AppCommand::None
            }
            Message::GpuPoolScaleResult {
                generation,
                name,
                size,
                previous,
                result,
            } => {
                if self.stale_action(generation, "scale") {
                    return AppCommand::None;
                }
                match result {
                    Ok(()) => {
                        info!(pool = %name, size, "pool scaled");
                        self.status = format!("Scaled {name} to {size}");
                    }
                    Err(error) => {
                        if let Some(pool) = self.dataset.gpu_pool_mut(&name) {
                            pool.size = previous;
                        }
                        warn!(pool = %name, size, error = %error, "pool scale failed");
                        self.status = format!("Scale of {name} failed: {error}");
                    }
                }
                self.refresh_rows();
                AppCommand::None
            }
            Message::DirectoryListed { dir, result } => {
                if self.view_mode != ViewMode::Export {
                    return AppCommand::None;
                }
                match result {
                    Ok(entries) => {
                        self.export.dir = dir;
                        self.export.entries = entries;
                        self.export.selected = 0;
                        self.status = format!("Export to {}", self.export.dir.display());
                    }
                    Err(error) => self.fail(error),
                }
                AppCommand::None
            }
            Message::ExportWritten { result } => {
                match result {
                    Ok(path) => {
                        info!(path = %path.display(), rows = self.rows.len(), "export written");
                        self.view_mode = ViewMode::List;
                        self.status = format!("Exported {} rows to {}", self.rows.len(), path.display());
                    }
                    Err(error) => self.fail(error),
                }
                AppCommand::None
            }
            Message::SetFilter(text) => {
                let text = text.trim().to_lowercase();
                self.new_filter = text.clone();
                self.apply_filter(text);
                AppCommand::None
            }
            Message::FilterTick(text) => {
                if text == self.new_filter {
                    self.apply_filter(text);
                } else {
                    debug!(tick = %text, current = %self.new_filter, "discarding stale filter tick");
                }
                AppCommand::None
            }
            Message::Notice(text) => {
                self.status = text;
                AppCommand::None
            }
            Message::WindowSize(_, height) => {
                self.page_size = usize::from(height.saturating_sub(6)).max(1);
                AppCommand::None
            }
            Message::Tick => {
                if self.pending_tasks > 0 || self.view_mode == ViewMode::Loading {
                    self.spinner = self.spinner.wrapping_add(1);
                }
                AppCommand::None
            }
            Message::Err(failure) => {
                if failure.generation < self.generation {
                    debug!(
                        request = failure.request.label(),
                        generation = failure.generation,
                        "discarding stale load failure"
                    );
                    self.pending_tasks = self.pending_tasks.saturating_sub(1);
                    return AppCommand::None;
                }
                self.pending_tasks = self.pending_tasks.saturating_sub(1);
                warn!(
                    request = failure.request.label(),
                    error = %failure.message,
                    "load failed"
                );
                let message = format!("failed to load {}: {}", failure.request.label(), failure.message);
                if self.view_mode == ViewMode::Loading || !self.dataset.has_data(self.category) {
                    self.fail(message);
                } else {
                    self.err = Some(message.clone());
                    self.status = message;
                }
                AppCommand::None
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.last_view_mode = self.view_mode;
        self.view_mode = ViewMode::Error;
        self.status = message.clone();
        self.err = Some(message);
    }

    /// Settles the task counter and reports whether the result is current.
    fn accept(&mut self, generation: u64, request: LoadRequest) -> bool {
        self.pending_tasks = self.pending_tasks.saturating_sub(1);
        if generation < self.generation {
            debug!(
                request = request.label(),
                generation,
                current = self.generation,
                "discarding stale load"
            );
            return false;
        }
        true
    }

    /// Action results dispatched before the last environment switch refer to
    /// a dataset that is gone.
    fn stale_action(&self, generation: u64, action: &str) -> bool {
        if generation >= self.env_generation {
            return false;
        }
        debug!(
            action,
            generation,
            env_generation = self.env_generation,
            "discarding action result from previous environment"
        );
        true
    }

    fn loaded(&mut self, request: LoadRequest) {
        debug!(request = request.label(), generation = self.generation, "load applied");
        self.status = format!("Loaded {}", request.label());
        self.refresh_rows();
    }

    fn ensure_data(&mut self) -> AppCommand {
        if self.dataset.has_data(self.category) {
            return AppCommand::None;
        }
        self.dispatch_load(LoadRequest::for_category(self.category))
    }

    fn dispatch_load(&mut self, request: LoadRequest) -> AppCommand {
        let Some(env) = self.dataset.environment.clone() else {
            self.status = "No environment selected".to_string();
            return AppCommand::None;
        };
        self.generation += 1;
        self.pending_tasks += 1;
        self.status = format!("Loading {}", request.label());
        debug!(request = request.label(), generation = self.generation, "dispatching load");
        AppCommand::Load {
            request,
            env,
            generation: self.generation,
        }
    }

    fn refresh_category(&mut self) -> AppCommand {
        self.dispatch_load(LoadRequest::for_category(self.category))
    }

    fn set_category(&mut self, target: Category, record: bool) -> AppCommand {
        if self.category == target {
            return AppCommand::None;
        }
        let origin = std::mem::replace(&mut self.category, target);
        if record {
            self.push_history(origin, target);
        }
        self.enforce_scope();
        self.sort = None;
        self.selected = 0;
        self.chosen = None;
        self.pending_confirmation = None;
        self.status = format!("{target}");
        self.refresh_rows();
        self.ensure_data()
    }

    /// The first recorded move also records where the session started, so
    /// history back can return to it.
    fn push_history(&mut self, origin: Category, category: Category) {
        if self.history.is_empty() {
            self.history.push(origin);
            self.history_idx = 0;
        }
        if self.history.get(self.history_idx) == Some(&category) {
            return;
        }
        self.history.truncate(self.history_idx + 1);
        self.history.push(category);
        if self.history.len() > HISTORY_LIMIT {
            let overflow = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..overflow);
        }
        self.history_idx = self.history.len() - 1;
    }

    fn move_history(&mut self, delta: isize) -> AppCommand {
        let target = self.history_idx as isize + delta;
        if target < 0 || target as usize >= self.history.len() {
            self.status = "No more history".to_string();
            return AppCommand::None;
        }
        self.history_idx = target as usize;
        self.set_category(self.history[self.history_idx], false)
    }

    fn enforce_scope(&mut self) {
        if let Some(ctx) = &self.scope
            && !ctx.category.is_scope_of(self.category)
        {
            debug!(scope = %ctx.category, category = %self.category, "clearing scope");
            self.scope = None;
            self.refresh_rows();
        }
    }

    fn refresh_rows(&mut self) {
        let previous = self.selected_key();
        let mut rows = rows::project(
            &self.dataset,
            self.category,
            self.scope.as_ref(),
            &self.filter,
            self.faulty_only,
        );
        if let Some(sort) = self.sort {
            rows::sort_rows(&mut rows, self.category, sort);
        }
        self.rows = rows;

        let restored = previous.and_then(|key| {
            self.rows
                .iter()
                .position(|row| item_key(self.category, row).as_ref() == Some(&key))
        });
        self.selected = restored.unwrap_or_else(|| self.selected.min(self.rows.len().saturating_sub(1)));
    }

    fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.rows.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    fn toggle_sort(&mut self, column: u8) {
        let Some(index) = usize::from(column).checked_sub(1) else {
            return;
        };
        let headers = rows::headers(self.category);
        let Some(header) = headers.get(index) else {
            self.status = format!("No column {column}");
            return;
        };
        let sort = SortState::toggle(self.sort, index);
        self.sort = Some(sort);
        self.refresh_rows();
        self.status = format!(
            "Sorted by {} {}",
            header.text,
            if sort.ascending { "asc" } else { "desc" }
        );
    }

    fn open_details(&mut self) {
        let Some(key) = self.selected_key() else {
            self.status = "Nothing selected".to_string();
            return;
        };
        self.status = format!("Details: {}", item_key_string(&key));
        self.chosen = Some(key);
        self.detail_scroll = 0;
        self.last_view_mode = self.view_mode;
        self.view_mode = ViewMode::Details;
    }

    fn enter_selected(&mut self) -> AppCommand {
        let Some(key) = self.selected_key() else {
            return AppCommand::None;
        };

        if self.category == Category::Environment {
            return self.change_environment(key.name());
        }

        if self.category == Category::Alias {
            return match Category::parse(key.name()) {
                Ok(category) => self.set_category(category, true),
                Err(error) => {
                    self.status = error.to_string();
                    AppCommand::None
                }
            };
        }

        if let Some(target) = self.category.scoped_categories().first().copied() {
            self.scope = Some(ScopeContext {
                category: self.category,
                name: key.name().to_string(),
            });
            info!(scope = %self.category, name = key.name(), target = %target, "descending into scope");
            return self.set_category(target, true);
        }

        self.open_details();
        AppCommand::None
    }

    fn step_back(&mut self) -> AppCommand {
        match self.scope.take() {
            Some(ctx) => {
                self.status = format!("Left scope {}", ctx.name);
                self.set_category(ctx.category, true)
            }
            None => AppCommand::None,
        }
    }

    fn change_environment(&mut self, key: &str) -> AppCommand {
        let Some(env) = self
            .dataset
            .environments
            .iter()
            .find(|env| env.key() == key)
            .cloned()
        else {
            return AppCommand::None;
        };

        if self.environment() == Some(&env) {
            self.status = format!("Already on {env}");
            return AppCommand::None;
        }

        info!(env = %env, "switching environment");
        self.generation += 1;
        self.env_generation = self.generation;
        self.pending_tasks = 1;
        self.scope = None;
        self.dataset = Dataset {
            environment: Some(env.clone()),
            ..Dataset::default()
        };
        self.rows.clear();
        self.selected = 0;
        self.view_mode = ViewMode::Loading;
        self.status = format!("Loading {env}");
        AppCommand::ChangeEnvironment {
            env,
            generation: self.generation,
        }
    }

    fn copy_selected(&mut self) -> AppCommand {
        match self.selected_key() {
            Some(key) => {
                let text = key.name().to_string();
                self.status = format!("Copied {text}");
                AppCommand::CopyToClipboard { text }
            }
            None => AppCommand::None,
        }
    }

    fn start_export(&mut self) -> AppCommand {
        self.last_view_mode = self.view_mode;
        self.view_mode = ViewMode::Export;
        self.export.entries.clear();
        self.export.selected = 0;
        self.status = "Choose a directory, s to save".to_string();
        AppCommand::ListDirectory {
            dir: self.export.dir.clone(),
        }
    }

    fn request_item_action(&mut self, action: ItemAction) -> AppCommand {
        if !self.category.supports(action) {
            self.status = format!("{} is not available for {}", action.label(), self.category);
            return AppCommand::None;
        }
        let Some(key) = self.selected_key() else {
            self.status = "Nothing selected".to_string();
            return AppCommand::None;
        };

        if action.needs_confirmation() {
            self.pending_confirmation = Some(PendingConfirmation { action });
            self.status = format!("{} {}? (y/n)", action.label(), item_key_string(&key));
            return AppCommand::None;
        }
        self.dispatch_item_action(action)
    }

    /// Applies the optimistic post-state and returns the outbound call.
    fn dispatch_item_action(&mut self, action: ItemAction) -> AppCommand {
        let Some(env) = self.dataset.environment.clone() else {
            return AppCommand::None;
        };
        let generation = self.generation;
        let Some(ItemKey::Scoped(ScopedItemKey { scope, name })) = self.selected_key() else {
            return self.dispatch_pool_action(action, env);
        };

        let command = match action {
            ItemAction::Delete => {
                let Some(dac) = self.dataset.dac_mut(&scope, &name) else {
                    return AppCommand::None;
                };
                let previous_status = std::mem::replace(&mut dac.status, "Deleting".to_string());
                AppCommand::DeleteDac {
                    env,
                    generation,
                    bucket: scope.clone(),
                    dac: dac.clone(),
                    previous_status,
                }
            }
            ItemAction::Cordon | ItemAction::Drain | ItemAction::Reboot => {
                let Some(node) = self.dataset.gpu_node_mut(&scope, &name) else {
                    return AppCommand::None;
                };
                let previous = NodeSnapshot {
                    status: node.status.clone(),
                    is_cordoned: node.is_cordoned,
                };
                match action {
                    ItemAction::Cordon => {
                        let cordon = !node.is_cordoned;
                        node.status = Some(if cordon { "Cordoning" } else { "Uncordoning" }.to_string());
                        AppCommand::SetCordon {
                            env,
                            generation,
                            node: node.clone(),
                            cordon,
                            previous,
                        }
                    }
                    ItemAction::Drain => {
                        node.status = Some("Draining".to_string());
                        node.is_cordoned = true;
                        AppCommand::Drain {
                            env,
                            generation,
                            node: node.clone(),
                            previous,
                        }
                    }
                    _ => {
                        node.status = Some("Rebooting".to_string());
                        AppCommand::Reboot {
                            env,
                            generation,
                            node: node.clone(),
                            previous,
                        }
                    }
                }
            }
            ItemAction::ScaleUp | ItemAction::ScaleDown => AppCommand::None,
        };

        info!(action = action.label(), bucket = %scope, name = %name, "dispatching item action");
        self.refresh_rows();
        command
    }

    fn dispatch_pool_action(&mut self, action: ItemAction, env: Environment) -> AppCommand {
        let delta = match action {
            ItemAction::ScaleUp => 1,
            ItemAction::ScaleDown => -1,
            _ => return AppCommand::None,
        };
        let Some(key) = self.selected_key() else {
            return AppCommand::None;
        };
        let Some(pool) = self.dataset.gpu_pool_mut(key.name()) else {
            return AppCommand::None;
        };

        let previous = pool.size;
        let size = (previous + delta).max(0);
        if size == previous {
            self.status = format!("{} is already empty", pool.name);
            return AppCommand::None;
        }
        pool.size = size;
        let pool = pool.clone();
        info!(pool = %pool.name, previous, size, "dispatching pool scale");
        self.refresh_rows();
        AppCommand::ScalePool {
            env,
            generation: self.generation,
            pool,
            size,
            previous,
        }
    }

    fn finish_node_action(
        &mut self,
        pool: &str,
        name: &str,
        verb: &str,
        previous: NodeSnapshot,
        result: Result<(), String>,
        on_success: impl FnOnce(&mut GpuNode),
    ) {
        let Some(node) = self.dataset.gpu_node_mut(pool, name) else {
            return;
        };
        match result {
            Ok(()) => {
                node.status = None;
                on_success(node);
                info!(pool, name, action = verb, "node action finished");
                self.status = format!("{verb} {name} done");
            }
            Err(error) => {
                node.status = previous.status;
                node.is_cordoned = previous.is_cordoned;
                warn!(pool, name, action = verb, error = %error, "node action failed");
                self.status = format!("{verb} {name} failed: {error}");
            }
        }
        self.refresh_rows();
    }
}

fn complete_alias(input: &str) -> Option<&'static str> {
    let input = input.trim().to_lowercase();
    Category::all_aliases()
        .into_iter()
        .find(|alias| alias.starts_with(&input))
}
