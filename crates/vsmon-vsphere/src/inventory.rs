//! Turns an inventory snapshot into per-entity tags and hostnames.

use crate::cache::{InventoryEntry, Staging};
use crate::config::CheckSettings;
use crate::entity::{EntityClass, EntityId, EntityProperties, Infrastructure, PowerState};
use crate::filters::FilterProperty;
use std::collections::HashSet;

/// Fill `staging` with an entry for every collected, unfiltered entity.
/// Returns the number of entries written.
pub fn build_inventory(
    infrastructure: &Infrastructure,
    settings: &CheckSettings,
    staging: &mut Staging<EntityId, InventoryEntry>,
) -> usize {
    let mut stored = 0;

    for (id, props) in infrastructure {
        if !settings.collection_type.collects(props.class) {
            continue;
        }

        let excluded = settings.resource_filters.is_excluded(props.class, |property| {
            filter_value(id, props, property, infrastructure)
        });
        if excluded {
            tracing::debug!(entity = %id, class = %props.class, "Entity excluded by resource filters");
            continue;
        }

        if props.class == EntityClass::VirtualMachine && props.power_state != Some(PowerState::PoweredOn) {
            tracing::debug!(entity = %id, "Skipping VM that is not powered on");
            continue;
        }

        staging.set(id.clone(), entry_for(id, props, infrastructure, settings.use_guest_hostname));
        stored += 1;
    }

    stored
}

fn entry_for(
    id: &EntityId,
    props: &EntityProperties,
    infrastructure: &Infrastructure,
    use_guest_hostname: bool,
) -> InventoryEntry {
    let name = props.name_or_unknown().to_string();
    let mut tags = Vec::new();
    let mut hostname = None;

    match props.class {
        EntityClass::VirtualMachine => {
            // The running host is not an inventory parent of the VM.
            tags.push(format!("vsphere_host:{}", runtime_host_name(props, infrastructure)));
            let guest = props
                .guest_hostname
                .as_deref()
                .filter(|guest| use_guest_hostname && !guest.is_empty());
            hostname = Some(guest.unwrap_or(&name).to_string());
        }
        EntityClass::Host => hostname = Some(name.clone()),
        class => tags.push(format!("vsphere_{class}:{name}")),
    }

    tags.extend(parent_tags(id, infrastructure));
    tags.push(format!("vsphere_type:{}", props.class));

    InventoryEntry {
        class: props.class,
        name,
        tags,
        hostname: hostname.filter(|h| !h.is_empty()),
    }
}

fn runtime_host_name<'a>(props: &EntityProperties, infrastructure: &'a Infrastructure) -> &'a str {
    props
        .runtime_host
        .as_ref()
        .and_then(|host| infrastructure.get(host))
        .map_or("unknown", |host| host.name_or_unknown())
}

fn filter_value(
    id: &EntityId,
    props: &EntityProperties,
    property: FilterProperty,
    infrastructure: &Infrastructure,
) -> Option<String> {
    match property {
        FilterProperty::Name => props.name.clone(),
        FilterProperty::InventoryPath => Some(inventory_path(id, infrastructure)),
        FilterProperty::Hostname => Some(runtime_host_name(props, infrastructure).to_string()),
        FilterProperty::GuestHostname => props.guest_hostname.clone(),
    }
}

/// Ancestors of `id` ordered from the root down to the direct parent.
///
/// The walk stops at the first missing or already visited parent, so a
/// malformed cycle in the `parent` chain cannot loop forever.
pub fn ancestors<'a>(id: &EntityId, infrastructure: &'a Infrastructure) -> Vec<(&'a EntityId, &'a EntityProperties)> {
    let mut chain = Vec::new();
    let mut visited: HashSet<&EntityId> = HashSet::new();

    let Some((start, props)) = infrastructure.get_key_value(id) else {
        return chain;
    };
    visited.insert(start);
    let mut next = props.parent.as_ref();

    while let Some(parent_id) = next {
        if !visited.insert(parent_id) {
            tracing::warn!(entity = %id, parent = %parent_id, "Cycle in inventory parent chain");
            break;
        }
        let Some((parent_id, parent)) = infrastructure.get_key_value(parent_id) else {
            tracing::debug!(entity = %id, parent = %parent_id, "Parent missing from inventory snapshot");
            break;
        };
        chain.push((parent_id, parent));
        next = parent.parent.as_ref();
    }

    chain.reverse();
    chain
}

/// Tags contributed by the ancestors of `id`, root first.
pub fn parent_tags(id: &EntityId, infrastructure: &Infrastructure) -> Vec<String> {
    let mut tags = Vec::new();
    for (_, parent) in ancestors(id, infrastructure) {
        let name = parent.name_or_unknown();
        match parent.class {
            EntityClass::Host => tags.push(format!("vsphere_host:{name}")),
            EntityClass::Folder => tags.push(format!("vsphere_folder:{name}")),
            EntityClass::Cluster => {
                tags.push(format!("vsphere_cluster:{name}"));
                tags.push(format!("vsphere_compute:{name}"));
            }
            EntityClass::ComputeResource => tags.push(format!("vsphere_compute:{name}")),
            EntityClass::Datacenter => tags.push(format!("vsphere_datacenter:{name}")),
            EntityClass::VirtualMachine | EntityClass::Datastore => {}
        }
    }
    tags
}

/// Slash-separated names from below the root folder down to the entity,
/// e.g. `/dc1/vm/web/web-01`.
pub fn inventory_path(id: &EntityId, infrastructure: &Infrastructure) -> String {
    let mut path = String::new();
    for (_, parent) in ancestors(id, infrastructure) {
        if parent.parent.is_none() {
            continue;
        }
        path.push('/');
        path.push_str(parent.name_or_unknown());
    }
    path.push('/');
    path.push_str(infrastructure.get(id).map_or("unknown", |p| p.name_or_unknown()));
    path
}
