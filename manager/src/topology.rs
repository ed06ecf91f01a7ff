//! Peer bookkeeping on instance requests.
//!
//! Zcash nodes keep a symmetric `peers` list and a `lwdInstance` list of the
//! gateways bound to them. A lightwalletd gateway keeps its single upstream
//! in `zcashInstance`. Every operation is idempotent and returns whether the
//! request changed. Applied to a request of the other type they do nothing
//! and return false.

use crate::model::{Instance, InstanceProperties, ResourceRequest};

pub fn add_peer(request: &mut ResourceRequest, name: &str) -> bool {
    let Some(props) = request.properties.as_zcash_mut() else {
        return false;
    };
    let added = props.peers.insert(name);
    if added && !request.peers.iter().any(|p| p == name) {
        request.peers.push(name.to_string());
    }
    added
}

pub fn remove_peer(request: &mut ResourceRequest, name: &str) -> bool {
    let Some(props) = request.properties.as_zcash_mut() else {
        return false;
    };
    let removed = props.peers.remove(name);
    request.peers.retain(|p| p != name);
    removed
}

pub fn add_lwd_instance(request: &mut ResourceRequest, name: &str) -> bool {
    request
        .properties
        .as_zcash_mut()
        .is_some_and(|props| props.lwd_instance.insert(name))
}

pub fn remove_lwd_instance(request: &mut ResourceRequest, name: &str) -> bool {
    request
        .properties
        .as_zcash_mut()
        .is_some_and(|props| props.lwd_instance.remove(name))
}

/// Bind a gateway to its upstream zcash node, replacing any previous one.
pub fn add_upstream(request: &mut ResourceRequest, name: &str) -> bool {
    let Some(props) = request.properties.as_lwd_mut() else {
        return false;
    };
    if props.zcash_instance.len() == 1 && props.zcash_instance.contains(name) {
        return false;
    }
    props.zcash_instance.clear();
    props.zcash_instance.insert(name);
    request.peers = vec![name.to_string()];
    true
}

pub fn clear_upstream(request: &mut ResourceRequest, name: &str) -> bool {
    let Some(props) = request.properties.as_lwd_mut() else {
        return false;
    };
    let removed = props.zcash_instance.remove(name);
    request.peers.retain(|p| p != name);
    removed
}

pub fn upstream(request: &ResourceRequest) -> Option<&str> {
    request
        .properties
        .as_lwd()
        .and_then(|props| props.zcash_instance.first())
}

/// Names of every instance this one is linked to, in property order.
pub fn linked_instances(instance: &Instance) -> Vec<String> {
    match &instance.request.properties {
        InstanceProperties::Zcash(props) => props
            .peers
            .iter()
            .chain(props.lwd_instance.iter())
            .map(str::to_string)
            .collect(),
        InstanceProperties::Lwd(props) => {
            props.zcash_instance.iter().map(str::to_string).collect()
        }
    }
}

/// Drop every reference to `name` from a peer's request.
pub fn unlink(request: &mut ResourceRequest, name: &str) -> bool {
    match request.properties {
        InstanceProperties::Zcash(_) => {
            let peer = remove_peer(request, name);
            let gateway = remove_lwd_instance(request, name);
            peer || gateway
        }
        InstanceProperties::Lwd(_) => clear_upstream(request, name),
    }
}
