//! Props resolver - turns prop bindings into concrete values.
//!
//! Resolution never fails. A binding to a data source that does not exist
//! resolves to [`Value::Undefined`] and logs one warning per
//! (instance, prop, data source).
//!
//! Results are memoized per instance. An entry stays valid while the
//! instance's binding revision and the write revision of every data source it
//! read are unchanged, so a data source update only recomputes the instances
//! that read it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::data_source::{DataSourceEngine, DataSourceId};
use crate::instance::InstanceId;
use crate::page::{Asset, Page, Pages, Params};
use crate::prop::{ExpressionRef, Prop, PropId, PropValue, PropsIndex};
use crate::value::{AssetId, AssetRef, Value};

/// Base used to normalize page paths and hashes.
const URL_BASE: &str = "https://any-valid.url";

/// A handler the component fires; running it executes the expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Prop the action is bound to (e.g. `onClick`).
    pub prop: String,
    /// Code and declared arguments.
    pub expression: ExpressionRef,
}

/// A concrete prop value handed to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResolvedProp {
    /// Plain value.
    Value(Value),
    /// Effectful handler.
    Action(ActionRef),
    /// Link to a project page.
    Page {
        /// Page path (`""` for the home page).
        path: String,
        /// Optional section anchor.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
    },
}

impl ResolvedProp {
    /// The plain value, if this is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The handler, if this is an action.
    #[must_use]
    pub const fn as_action(&self) -> Option<&ActionRef> {
        match self {
            Self::Action(action) => Some(action),
            _ => None,
        }
    }
}

/// Ordered props of one instance.
pub type ResolvedProps = IndexMap<String, ResolvedProp>;

/// A URL-typed prop classified by what it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUrl {
    /// A project page.
    Page {
        /// Page path (`""` for the home page).
        path: String,
        /// Optional section anchor.
        hash: Option<String>,
    },
    /// An uploaded asset.
    Asset {
        /// Stored file name.
        name: String,
    },
    /// A free-form URL.
    String(String),
}

impl ResolvedUrl {
    /// Classify an already resolved prop.
    #[must_use]
    pub fn from_prop(prop: &ResolvedProp) -> Option<Self> {
        match prop {
            ResolvedProp::Page { path, hash } => Some(Self::Page {
                path: path.clone(),
                hash: hash.clone(),
            }),
            ResolvedProp::Value(Value::Asset(asset)) => Some(Self::Asset {
                name: asset.name.clone(),
            }),
            ResolvedProp::Value(Value::String(url)) => Some(Self::String(url.clone())),
            _ => None,
        }
    }

    /// Final link target; see [`href`].
    #[must_use]
    pub fn href(&self, params: &Params) -> String {
        match self {
            Self::Page { path, hash } => page_href(path, hash.as_deref()),
            Self::Asset { name } => format!("{}{name}", params.asset_base_url),
            Self::String(url) => url.clone(),
        }
    }
}

/// Link target for a resolved `href` prop.
///
/// Pages become their path (`""` is `/`) with a URL-encoded `#hash`, assets
/// become `asset_base_url + name`, strings pass through and anything else
/// (including an unset prop) is `#`.
#[must_use]
pub fn href(prop: Option<&ResolvedProp>, params: &Params) -> String {
    prop.and_then(ResolvedUrl::from_prop)
        .map_or_else(|| "#".to_string(), |url| url.href(params))
}

fn page_href(path: &str, hash: Option<&str>) -> String {
    let path = if path.is_empty() { "/" } else { path };
    let Ok(mut url) = Url::parse(URL_BASE).and_then(|base| base.join(path)) else {
        return path.to_string();
    };
    match hash {
        Some(hash) => {
            url.set_fragment(Some(&encode_uri_component(hash)));
            format!("{}#{}", url.path(), url.fragment().unwrap_or_default())
        }
        None => url.path().to_string(),
    }
}

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

#[derive(Debug, Clone)]
struct MemoEntry {
    binding_revision: u64,
    reads: Vec<(DataSourceId, Option<u64>)>,
    props: ResolvedProps,
}

/// Resolves instance props against the live data source values.
pub struct PropsResolver {
    data: Arc<DataSourceEngine>,
    props: PropsIndex,
    binding_revisions: HashMap<InstanceId, u64>,
    next_revision: u64,
    pages: HashMap<String, Page>,
    assets: HashMap<AssetId, Asset>,
    params: Params,
    memo: Mutex<HashMap<InstanceId, MemoEntry>>,
    warned: Mutex<HashSet<(InstanceId, String, String)>>,
    recomputes: AtomicU64,
}

impl std::fmt::Debug for PropsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropsResolver")
            .field("params", &self.params)
            .field("recomputes", &self.recompute_count())
            .finish_non_exhaustive()
    }
}

impl PropsResolver {
    /// Create a resolver reading from `data`.
    #[must_use]
    pub fn new(data: Arc<DataSourceEngine>, params: Params) -> Self {
        Self {
            data,
            props: PropsIndex::default(),
            binding_revisions: HashMap::new(),
            next_revision: 0,
            pages: HashMap::new(),
            assets: HashMap::new(),
            params,
            memo: Mutex::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
            recomputes: AtomicU64::new(0),
        }
    }

    /// The data source engine props are read from.
    #[must_use]
    pub fn data(&self) -> &Arc<DataSourceEngine> {
        &self.data
    }

    /// Render parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Replace every prop binding.
    ///
    /// Only instances whose bindings actually changed are invalidated.
    pub fn set_props<'a>(&mut self, props: impl IntoIterator<Item = &'a Prop>) {
        let next = PropsIndex::from_props(props);
        let touched: HashSet<InstanceId> = self
            .props
            .instance_ids()
            .chain(next.instance_ids())
            .filter(|id| self.props.props_of(id) != next.props_of(id))
            .cloned()
            .collect();
        self.props = next;
        for id in touched {
            self.bump_binding(id);
        }
    }

    /// Add or replace single bindings, matched by prop id.
    pub fn upsert_props(&mut self, updates: impl IntoIterator<Item = Prop>) {
        let mut all: Vec<Prop> = self.props.iter().cloned().collect();
        for prop in updates {
            match all.iter_mut().find(|p| p.id == prop.id) {
                Some(existing) => *existing = prop,
                None => all.push(prop),
            }
        }
        self.set_props(&all);
    }

    /// Remove bindings by prop id.
    pub fn remove_props(&mut self, ids: &[PropId]) {
        let all: Vec<Prop> = self
            .props
            .iter()
            .filter(|p| !ids.contains(&p.id))
            .cloned()
            .collect();
        self.set_props(&all);
    }

    /// Every binding, grouped by instance.
    #[must_use]
    pub const fn props(&self) -> &PropsIndex {
        &self.props
    }

    /// Replace the page set used by page bindings.
    pub fn set_pages(&mut self, pages: &Pages) {
        self.pages = pages.by_id();
        self.invalidate_all();
    }

    /// Replace the asset set used by asset bindings.
    pub fn set_assets(&mut self, assets: impl IntoIterator<Item = Asset>) {
        self.assets = assets.into_iter().map(|a| (a.id.clone(), a)).collect();
        self.invalidate_all();
    }

    /// Replace the render parameters.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
        self.invalidate_all();
    }

    fn bump_binding(&mut self, id: InstanceId) {
        self.next_revision += 1;
        self.binding_revisions.insert(id, self.next_revision);
    }

    fn invalidate_all(&mut self) {
        self.memo
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    /// Number of times an instance's props were recomputed rather than
    /// served from the memo.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Resolve every prop of an instance, in declaration order.
    #[must_use]
    pub fn resolve_props(&self, instance_id: &str) -> ResolvedProps {
        let binding_revision = self.binding_revisions.get(instance_id).copied().unwrap_or(0);
        {
            let memo = self.memo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(entry) = memo.get(instance_id) {
                if entry.binding_revision == binding_revision && self.reads_current(&entry.reads) {
                    return entry.props.clone();
                }
            }
        }

        let mut reads = Vec::new();
        let props: ResolvedProps = self
            .props
            .props_of(instance_id)
            .iter()
            .map(|prop| (prop.name.clone(), self.resolve_one(prop, &mut reads)))
            .collect();
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(instance = %instance_id, props = props.len(), "Resolved props");

        self.memo
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                instance_id.to_string(),
                MemoEntry {
                    binding_revision,
                    reads,
                    props: props.clone(),
                },
            );
        props
    }

    /// Classify a URL-typed prop of an instance.
    #[must_use]
    pub fn resolve_url(&self, instance_id: &str, prop: &str) -> Option<ResolvedUrl> {
        self.resolve_props(instance_id)
            .get(prop)
            .and_then(ResolvedUrl::from_prop)
    }

    /// Final link target of a URL-typed prop; see [`href`].
    #[must_use]
    pub fn href(&self, instance_id: &str, prop: &str) -> String {
        self.resolve_url(instance_id, prop)
            .map_or_else(|| "#".to_string(), |url| url.href(&self.params))
    }

    fn reads_current(&self, reads: &[(DataSourceId, Option<u64>)]) -> bool {
        reads
            .iter()
            .all(|(id, revision)| self.data.lookup(id).map(|l| l.revision) == *revision)
    }

    fn resolve_one(&self, prop: &Prop, reads: &mut Vec<(DataSourceId, Option<u64>)>) -> ResolvedProp {
        match &prop.value {
            PropValue::Literal(value) => ResolvedProp::Value(value.clone()),
            PropValue::DataSource(id) => {
                let lookup = self.data.lookup(id);
                reads.push((id.clone(), lookup.as_ref().map(|l| l.revision)));
                match lookup {
                    Some(lookup) => ResolvedProp::Value(lookup.value),
                    None => {
                        self.warn_once(prop, id, "Prop bound to unknown data source");
                        ResolvedProp::Value(Value::Undefined)
                    }
                }
            }
            PropValue::Expression(expression) => ResolvedProp::Action(ActionRef {
                instance_id: prop.instance_id.clone(),
                prop: prop.name.clone(),
                expression: expression.clone(),
            }),
            PropValue::Asset(asset_id) => match self.assets.get(asset_id) {
                Some(asset) => ResolvedProp::Value(Value::Asset(
                    AssetRef::new(asset.id.clone(), asset.name.clone())
                        .with_url(self.params.asset_url(asset)),
                )),
                None => {
                    self.warn_once(prop, asset_id, "Prop bound to unknown asset");
                    ResolvedProp::Value(Value::Undefined)
                }
            },
            PropValue::Page { page_id, hash } => match self.pages.get(page_id) {
                Some(page) => ResolvedProp::Page {
                    path: page.path.clone(),
                    hash: hash.clone(),
                },
                None => {
                    self.warn_once(prop, page_id, "Prop bound to unknown page");
                    ResolvedProp::Value(Value::Undefined)
                }
            },
        }
    }

    fn warn_once(&self, prop: &Prop, target: &str, message: &str) {
        let key = (prop.instance_id.clone(), prop.name.clone(), target.to_string());
        let first = self
            .warned
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key);
        if first {
            tracing::warn!(
                instance = %prop.instance_id,
                prop = %prop.name,
                target = %target,
                "{message}"
            );
        }
    }

    /// How many distinct unresolved bindings have been reported.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warned
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
