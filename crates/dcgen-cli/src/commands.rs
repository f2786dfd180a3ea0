//! Subcommand implementations.

use std::sync::Arc;

use dcgen_core::{
    Clipboard, ClipboardAction, ClipboardItem, DataStore, DataStores, Definition, LoggingListener,
    ModelCollector, Orchestrator, PasteTarget, Record, RecordingListener,
    SledStorage, StoreConfig, TreeCollector, TreeNodeStates,
};
use dcgen_proto::{RecordId, Value};
use tracing::info;

use crate::error::CliError;
use crate::formatter::Formatter;
use crate::Args;

/// The opened database and the collector over it.
pub struct Workspace {
    storage: SledStorage,
    collector: ModelCollector,
}

impl Workspace {
    /// Load the definition and open one store per record type it mentions.
    pub fn open(args: &Args) -> Result<Self, CliError> {
        let definition = Definition::from_path(&args.definition)?;
        let config = if args.temporary {
            StoreConfig::temporary()
        } else {
            StoreConfig::new(&args.data)
        };
        Self::with_config(definition, config)
    }

    fn with_config(definition: Definition, config: StoreConfig) -> Result<Self, CliError> {
        let storage = SledStorage::open(config)?;
        let mut stores = DataStores::new();
        for record_type in definition.record_types() {
            stores.register(Arc::new(storage.store(record_type)?));
        }
        let collector = ModelCollector::new(Arc::new(definition), stores);
        Ok(Self { storage, collector })
    }

    fn definition(&self) -> &Definition {
        self.collector.definition()
    }

    fn require(&self, serialized: &str) -> Result<Record, CliError> {
        let id = RecordId::parse(serialized)?;
        self.collector
            .get_record(&id)?
            .ok_or_else(|| CliError::Core(dcgen_core::Error::RecordNotFound(id)))
    }
}

/// `check`: the definition loaded and validated when the workspace opened.
pub fn check(workspace: &Workspace, formatter: &dyn Formatter) -> Result<String, CliError> {
    let stored = workspace.storage.record_types();
    Ok(formatter.format_definition(workspace.definition(), &stored))
}

/// Parse a `KEY=VALUE` argument. Values that are JSON scalars keep their
/// type, everything else is a string.
fn parse_property(raw: &str) -> Result<(String, Value), CliError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Usage(format!("expected KEY=VALUE, got '{}'", raw)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::Usage(format!("empty property name in '{}'", raw)));
    }
    let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

/// `add`: save one record as given. Records of the root type without a
/// parent become roots.
pub fn add(
    workspace: &Workspace,
    formatter: &dyn Formatter,
    record_type: Option<&str>,
    parent: Option<&str>,
    properties: &[String],
) -> Result<String, CliError> {
    let record_type = record_type.unwrap_or(&workspace.definition().root_type);
    let store = workspace.collector.store(record_type)?;

    let mut record = store.empty_record();
    for raw in properties {
        let (key, value) = parse_property(raw)?;
        record.set(key, value);
    }
    match parent {
        Some(parent) => {
            let parent = workspace.require(parent)?;
            workspace.collector.relationships().set_parent(&mut record, &parent)?;
        }
        None if record_type == workspace.definition().root_type => {
            workspace.collector.relationships().set_root(&mut record)?;
        }
        None => {}
    }

    store.save(&mut record)?;
    workspace.storage.flush()?;
    info!(record = ?record.record_id(), "record added");
    Ok(formatter.format_records(&[record]))
}

/// `tree`: print the tree with the requested nodes expanded.
pub fn tree(
    workspace: &Workspace,
    formatter: &dyn Formatter,
    root: Option<&str>,
    expand_all: bool,
    expand: &[String],
) -> Result<String, CliError> {
    let mut states = TreeNodeStates::new();
    states.set_all_open(expand_all);
    for raw in expand {
        let id = RecordId::parse(raw)?;
        states.set_expanded(&id.record_type, &id.id, true);
    }

    let root = root.map(RecordId::parse).transpose()?;
    let nodes = TreeCollector::new(&workspace.collector, &states).collect(root.as_ref())?;
    Ok(formatter.format_tree(&nodes))
}

/// `siblings`: the ordered siblings of a record, the record included.
pub fn siblings(workspace: &Workspace, formatter: &dyn Formatter, id: &str) -> Result<String, CliError> {
    let record = workspace.require(id)?;
    let sorting = workspace.definition().manual_sorting.as_deref();
    let siblings = workspace.collector.collect_siblings_of(&record, sorting, None)?;
    Ok(formatter.format_records(&siblings))
}

/// Arguments of `paste`.
#[derive(Debug, Clone, Copy)]
pub struct PasteRequest<'a> {
    /// What to do with the source.
    pub action: ClipboardAction,
    /// Serialized id of the record to move or copy.
    pub source: Option<&'a str>,
    /// Type of created records.
    pub record_type: Option<&'a str>,
    /// Parent the records are meant for.
    pub parent: Option<&'a str>,
    /// Sibling to place after.
    pub after: Option<&'a str>,
    /// Parent to place at the front of.
    pub into: Option<&'a str>,
    /// Top level: empty for the parentless top, or a parent id.
    pub top: Option<&'a str>,
}

impl PasteRequest<'_> {
    fn item(&self, definition: &Definition) -> Result<ClipboardItem, CliError> {
        let parent = self.parent.map(RecordId::parse).transpose()?;
        match (self.action, self.source) {
            (ClipboardAction::Create, _) => Ok(ClipboardItem::create(
                self.record_type.unwrap_or(&definition.root_type),
                parent,
            )),
            (action, Some(source)) => Ok(ClipboardItem::with_source(
                action,
                RecordId::parse(source)?,
                parent,
            )),
            (action, None) => Err(CliError::Usage(format!("{} needs --source", action))),
        }
    }
}

/// `paste`: run one clipboard intent against the database.
pub fn paste(
    workspace: &Workspace,
    formatter: &dyn Formatter,
    request: &PasteRequest<'_>,
    verbose: bool,
) -> Result<String, CliError> {
    let item = request.item(workspace.definition())?;
    let target = PasteTarget::from_params(request.after, request.into, request.top)?;

    let clipboard = Clipboard::new();
    let recorder = Arc::new(RecordingListener::new());
    let orchestrator = Orchestrator::new(&workspace.collector, &clipboard)
        .with_listener(Arc::new(LoggingListener))
        .with_listener(recorder.clone());

    let result = orchestrator.paste_item(item, &target)?;
    workspace.storage.flush()?;

    let mut output = formatter.format_paste(&result);
    if verbose {
        output.push('\n');
        output.push_str(&formatter.format_events(&recorder.events()));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{create_formatter, OutputFormat};

    const PAGES: &str = r#"{
        "name": "pages",
        "mode": "hierarchical",
        "root_type": "tl_page",
        "root_condition": {
            "record_type": "tl_page",
            "filter": [{"compare": {"local": "pid", "remote": {"value": 0}}}],
            "set_on": [{"constant": {"property": "pid", "value": 0}}]
        },
        "conditions": [{
            "parent_type": "tl_page",
            "child_type": "tl_page",
            "filter": [{"compare": {"local": "pid", "remote": {"property": "id"}}}],
            "set_on": [{"copy": {"to_field": "pid", "from_field": "id"}}],
            "inverse": [{"local": "id", "remote": "pid"}]
        }],
        "manual_sorting": "sorting"
    }"#;

    fn workspace() -> Workspace {
        let definition = Definition::from_json(PAGES).unwrap();
        Workspace::with_config(definition, StoreConfig::temporary()).unwrap()
    }

    fn request(action: ClipboardAction) -> PasteRequest<'static> {
        PasteRequest {
            action,
            source: None,
            record_type: None,
            parent: None,
            after: None,
            into: None,
            top: None,
        }
    }

    #[test]
    fn test_parse_property() {
        assert_eq!(parse_property("sorting=128").unwrap(), ("sorting".to_string(), Value::Int(128)));
        assert_eq!(parse_property("title=Home").unwrap(), ("title".to_string(), Value::from("Home")));
        assert_eq!(
            parse_property("title=\"a=b\"").unwrap(),
            ("title".to_string(), Value::from("a=b"))
        );
        assert!(matches!(parse_property("title"), Err(CliError::Usage(_))));
        assert!(matches!(parse_property("=1"), Err(CliError::Usage(_))));
    }

    #[test]
    fn test_add_paste_and_tree() {
        let workspace = workspace();
        let formatter = create_formatter(OutputFormat::Table);

        add(&workspace, &*formatter, None, None, &["title=Home".to_string(), "sorting=128".to_string()]).unwrap();
        add(&workspace, &*formatter, None, None, &["title=About".to_string(), "sorting=256".to_string()]).unwrap();

        let mut create = request(ClipboardAction::Create);
        create.into = Some("tl_page::1");
        paste(&workspace, &*formatter, &create, false).unwrap();

        let output = tree(&workspace, &*formatter, None, true, &[]).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("- tl_page::"));
        assert!(lines[1].starts_with("    tl_page::"));

        let collapsed = tree(&workspace, &*formatter, None, false, &[]).unwrap();
        assert_eq!(collapsed.lines().count(), 2);
        assert!(collapsed.starts_with("+ "));
    }

    #[test]
    fn test_paste_requires_source_and_target() {
        let workspace = workspace();
        let formatter = create_formatter(OutputFormat::Json);

        let mut cut = request(ClipboardAction::Cut);
        cut.top = Some("");
        assert!(matches!(
            paste(&workspace, &*formatter, &cut, false),
            Err(CliError::Usage(_))
        ));

        let create = request(ClipboardAction::Create);
        assert!(matches!(
            paste(&workspace, &*formatter, &create, false),
            Err(CliError::Core(dcgen_core::Error::InvalidParameters(_)))
        ));
    }

    #[test]
    fn test_siblings_verbose_paste() {
        let workspace = workspace();
        let formatter = create_formatter(OutputFormat::Json);
        add(&workspace, &*formatter, None, None, &["sorting=128".to_string()]).unwrap();

        let mut copy = request(ClipboardAction::Copy);
        copy.source = Some("tl_page::1");
        copy.after = Some("tl_page::1");
        let output = paste(&workspace, &*formatter, &copy, true).unwrap();
        assert!(output.contains("\"pre\""));

        let siblings = siblings(&workspace, &*formatter, "tl_page::1").unwrap();
        let value: serde_json::Value = serde_json::from_str(&siblings).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(value[1]["properties"]["sorting"], 256);
    }
}
