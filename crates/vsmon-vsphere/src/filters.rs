use crate::entity::EntityClass;
use crate::error::{Result, VsphereError};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Entity property a resource filter can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterProperty {
    Name,
    InventoryPath,
    /// VM only: name of the host running the VM.
    Hostname,
    /// VM only: hostname reported by the guest.
    GuestHostname,
}

impl FilterProperty {
    pub fn parse(class: EntityClass, property: &str) -> Option<Self> {
        let parsed = match property {
            "name" => FilterProperty::Name,
            "inventory_path" => FilterProperty::InventoryPath,
            "hostname" => FilterProperty::Hostname,
            "guest_hostname" => FilterProperty::GuestHostname,
            _ => return None,
        };
        let vm_only = matches!(parsed, FilterProperty::Hostname | FilterProperty::GuestHostname);
        if vm_only && class != EntityClass::VirtualMachine {
            return None;
        }
        Some(parsed)
    }
}

impl fmt::Display for FilterProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterProperty::Name => "name",
            FilterProperty::InventoryPath => "inventory_path",
            FilterProperty::Hostname => "hostname",
            FilterProperty::GuestHostname => "guest_hostname",
        };
        f.write_str(s)
    }
}

pub(crate) fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| VsphereError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Include filters keyed by (class, property).
#[derive(Debug, Clone, Default)]
pub struct ResourceFilters {
    filters: HashMap<(EntityClass, FilterProperty), Vec<Regex>>,
}

impl ResourceFilters {
    /// Returns `false` if a filter is already registered for this key.
    pub fn insert(&mut self, class: EntityClass, property: FilterProperty, patterns: Vec<Regex>) -> bool {
        if self.filters.contains_key(&(class, property)) {
            return false;
        }
        self.filters.insert((class, property), patterns);
        true
    }

    pub fn has_filter(&self, class: EntityClass, property: FilterProperty) -> bool {
        self.filters.contains_key(&(class, property))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// An entity is excluded as soon as one registered filter of its class
    /// has no pattern found in the property value. `value_of` is only called
    /// for registered properties; a missing value matches as `""`.
    pub fn is_excluded<F>(&self, class: EntityClass, mut value_of: F) -> bool
    where
        F: FnMut(FilterProperty) -> Option<String>,
    {
        self.filters
            .iter()
            .filter(|((filter_class, _), _)| *filter_class == class)
            .any(|((_, property), patterns)| {
                let value = value_of(*property).unwrap_or_default();
                !patterns.iter().any(|re| re.is_match(&value))
            })
    }
}

/// Exclude filters on metric names, per class.
#[derive(Debug, Clone, Default)]
pub struct MetricFilters {
    by_class: HashMap<EntityClass, Vec<Regex>>,
}

impl MetricFilters {
    pub fn insert(&mut self, class: EntityClass, patterns: Vec<Regex>) {
        self.by_class.entry(class).or_default().extend(patterns);
    }

    pub fn is_excluded(&self, class: EntityClass, metric_name: &str) -> bool {
        self.by_class
            .get(&class)
            .is_some_and(|patterns| patterns.iter().any(|re| re.is_match(metric_name)))
    }
}
