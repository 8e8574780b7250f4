//! Persists the node inventory as a single TLV envelope in a [`BlobStore`].
//!
//! Only structure is cached: node scalars, endpoints, their cluster ids and
//! device type ids. Devices are rebuilt from the device type ids on decode.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    data_model::Node,
    tlv::{Element, Encoder, TagControl, TlvError, TlvReader, TlvType},
    NodeId,
};

mod store;

pub use store::{BlobStore, MemoryStore, StoreError};

pub const CACHE_KEY: &str = "com.matter.gateway.nodes";
pub const MAX_CACHE_SIZE: usize = 100 * 1024;
pub const CACHE_VERSION: u64 = 1;

const TAG_VERSION: u8 = 1;
const TAG_NODE_ID: u8 = 1;
const TAG_FABRIC_INDEX: u8 = 2;
const TAG_NODES: u8 = 3;
const TAG_ENDPOINTS: u8 = 4;
const TAG_ENDPOINT_ID: u8 = 5;
const TAG_CLUSTERS: u8 = 6;
const TAG_CLUSTER_ID: u8 = 7;
const TAG_DEVICE_TYPES: u8 = 9;
const TAG_DEVICE_TYPE_ID: u8 = 10;
const TAG_VENDOR_ID: u8 = 11;
const TAG_PRODUCT_ID: u8 = 12;
const TAG_DISCRIMINATOR: u8 = 13;
const TAG_PORT: u8 = 14;
const TAG_LAST_DISCOVERED: u8 = 15;
const TAG_SETUP_PAYLOAD: u8 = 16;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("encoded cache is {size} bytes, above the {max} byte limit")]
    CapacityExceeded { size: usize, max: usize },
    #[error("malformed cache: {0}")]
    Malformed(&'static str),
    #[error("unsupported cache version {0}")]
    UnsupportedVersion(u64),
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct MatterCache {
    store: Arc<dyn BlobStore>,
    max_size: usize,
}

impl MatterCache {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_max_size(store, MAX_CACHE_SIZE)
    }

    pub fn with_max_size(store: Arc<dyn BlobStore>, max_size: usize) -> Self {
        Self { store, max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Encode `nodes` in order. Fails without output if the result is above the size limit.
    pub fn encode<'a>(
        &self,
        nodes: impl IntoIterator<Item = &'a Node>,
    ) -> Result<Vec<u8>, CacheError> {
        let mut encoder = Encoder::default();
        encoder.start_structure(TagControl::Anonymous);
        encoder.put_unsigned(TagControl::ContextSpecific(TAG_VERSION), CACHE_VERSION);
        encoder.start_array(TagControl::ContextSpecific(TAG_NODES));
        for node in nodes {
            encode_node(&mut encoder, node);
        }
        encoder.end_container();
        encoder.end_container();

        if encoder.len() > self.max_size {
            return Err(CacheError::CapacityExceeded {
                size: encoder.len(),
                max: self.max_size,
            });
        }
        Ok(encoder.inner())
    }

    pub fn decode(bytes: &[u8]) -> Result<Vec<Node>, CacheError> {
        let mut reader = Reader(TlvReader::new(bytes));
        let envelope = reader.next()?;
        expect_container(&envelope, TlvType::Structure, TagControl::Anonymous)?;

        let mut version = None;
        let mut nodes = vec![];
        loop {
            let element = reader.next()?;
            match (element.get_control(), element.get_type()) {
                (_, TlvType::EndOfContainer) => break,
                (TagControl::ContextSpecific(TAG_VERSION), TlvType::UnsignedInt(_)) => {
                    let v = unsigned::<u64>(&element, "version")?;
                    if v != CACHE_VERSION {
                        return Err(CacheError::UnsupportedVersion(v));
                    }
                    version = Some(v);
                }
                (TagControl::ContextSpecific(TAG_NODES), TlvType::Array) => {
                    if version.is_none() {
                        return Err(CacheError::Malformed("nodes before version"));
                    }
                    loop {
                        let element = reader.next()?;
                        if element.get_type() == TlvType::EndOfContainer {
                            break;
                        }
                        expect_container(&element, TlvType::Structure, TagControl::Anonymous)?;
                        nodes.push(decode_node(&mut reader)?);
                    }
                }
                _ => return Err(CacheError::Malformed("unexpected envelope element")),
            }
        }
        if version.is_none() {
            return Err(CacheError::Malformed("missing version"));
        }
        if reader.0.remaining() > 0 {
            return Err(CacheError::Malformed("trailing data"));
        }
        Ok(nodes)
    }

    /// The cached nodes. A missing, unreadable or malformed cache reads as empty.
    pub fn load(&self) -> Vec<Node> {
        let bytes = match self.store.get(CACHE_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("no cached nodes");
                return vec![];
            }
            Err(e) => {
                warn!(error = %e, "could not read node cache");
                return vec![];
            }
        };
        match Self::decode(&bytes) {
            Ok(nodes) => {
                info!(count = nodes.len(), "loaded cached nodes");
                nodes
            }
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "discarding malformed node cache");
                vec![]
            }
        }
    }

    /// Replace the cached nodes. Nothing is written if encoding fails.
    pub fn store<'a>(&self, nodes: impl IntoIterator<Item = &'a Node>) -> Result<(), CacheError> {
        let bytes = self.encode(nodes)?;
        self.store.put(CACHE_KEY, &bytes)?;
        debug!(len = bytes.len(), "stored node cache");
        Ok(())
    }

    /// Add `node`, replacing a cached node with the same id in place
    pub fn add_node(&self, node: &Node) -> Result<(), CacheError> {
        let cached = self.load();
        let mut nodes: Vec<&Node> = cached.iter().collect();
        match nodes.iter().position(|n| n.node_id == node.node_id) {
            Some(index) => nodes[index] = node,
            None => nodes.push(node),
        }
        self.store(nodes)
    }

    /// Returns whether the node was cached
    pub fn delete_node(&self, node_id: NodeId) -> Result<bool, CacheError> {
        let mut nodes = self.load();
        let before = nodes.len();
        nodes.retain(|n| n.node_id != node_id);
        if nodes.len() == before {
            return Ok(false);
        }
        self.store(&nodes)?;
        Ok(true)
    }

    pub fn purge(&self) -> Result<(), CacheError> {
        if self.store.delete(CACHE_KEY)? {
            info!("purged node cache");
        }
        Ok(())
    }
}

fn encode_node(encoder: &mut Encoder, node: &Node) {
    let tag = TagControl::ContextSpecific;
    encoder.start_structure(TagControl::Anonymous);
    encoder.put_unsigned(tag(TAG_NODE_ID), node.node_id);
    encoder.put_unsigned(tag(TAG_FABRIC_INDEX), node.fabric_index as u64);
    encoder.put_unsigned(tag(TAG_VENDOR_ID), node.vendor_id as u64);
    encoder.put_unsigned(tag(TAG_PRODUCT_ID), node.product_id as u64);
    encoder.put_unsigned(tag(TAG_DISCRIMINATOR), node.discriminator as u64);
    encoder.put_unsigned(tag(TAG_PORT), node.port as u64);
    encoder.put_signed(tag(TAG_LAST_DISCOVERED), node.last_discovered);
    encoder.put_str(tag(TAG_SETUP_PAYLOAD), &node.setup_payload);
    encoder.start_array(tag(TAG_ENDPOINTS));
    for endpoint in node.endpoints() {
        encoder.start_structure(TagControl::Anonymous);
        encoder.put_unsigned(tag(TAG_ENDPOINT_ID), endpoint.endpoint_id() as u64);
        encoder.start_array(tag(TAG_CLUSTERS));
        for &cluster in endpoint.clusters() {
            encoder.put_unsigned(tag(TAG_CLUSTER_ID), cluster as u64);
        }
        encoder.end_container();
        encoder.start_array(tag(TAG_DEVICE_TYPES));
        for &device_type in endpoint.device_types() {
            encoder.put_unsigned(tag(TAG_DEVICE_TYPE_ID), device_type as u64);
        }
        encoder.end_container();
        encoder.end_container();
    }
    encoder.end_container();
    encoder.end_container();
}

/// Decodes the fields of a node structure whose start has been consumed
fn decode_node(reader: &mut Reader) -> Result<Node, CacheError> {
    let mut node_id = None;
    let mut fabric_index = None;
    let mut scalars = NodeScalars::default();
    let mut endpoints = vec![];

    loop {
        let element = reader.next()?;
        let TagControl::ContextSpecific(tag) = element.get_control() else {
            if element.get_type() == TlvType::EndOfContainer {
                break;
            }
            return Err(CacheError::Malformed("node field without a context tag"));
        };
        match (tag, element.get_type()) {
            (TAG_NODE_ID, TlvType::UnsignedInt(_)) => {
                node_id = Some(unsigned(&element, "node id")?)
            }
            (TAG_FABRIC_INDEX, TlvType::UnsignedInt(_)) => {
                fabric_index = Some(unsigned(&element, "fabric index")?)
            }
            (TAG_VENDOR_ID, TlvType::UnsignedInt(_)) => {
                scalars.vendor_id = unsigned(&element, "vendor id")?
            }
            (TAG_PRODUCT_ID, TlvType::UnsignedInt(_)) => {
                scalars.product_id = unsigned(&element, "product id")?
            }
            (TAG_DISCRIMINATOR, TlvType::UnsignedInt(_)) => {
                scalars.discriminator = unsigned(&element, "discriminator")?
            }
            (TAG_PORT, TlvType::UnsignedInt(_)) => scalars.port = unsigned(&element, "port")?,
            (TAG_LAST_DISCOVERED, TlvType::SignedInt(_)) => {
                scalars.last_discovered = element
                    .get_value()
                    .as_i64()
                    .ok_or(CacheError::Malformed("last discovered"))?
            }
            (TAG_SETUP_PAYLOAD, TlvType::String(..)) => {
                scalars.setup_payload = element
                    .get_value()
                    .as_str()
                    .ok_or(CacheError::Malformed("setup payload"))?
                    .to_string()
            }
            (TAG_ENDPOINTS, TlvType::Array) => loop {
                let element = reader.next()?;
                if element.get_type() == TlvType::EndOfContainer {
                    break;
                }
                expect_container(&element, TlvType::Structure, TagControl::Anonymous)?;
                endpoints.push(decode_endpoint(reader)?);
            },
            _ => return Err(CacheError::Malformed("unexpected node element")),
        }
    }

    let node_id = node_id.ok_or(CacheError::Malformed("missing node id"))?;
    let fabric_index = fabric_index.ok_or(CacheError::Malformed("missing fabric index"))?;
    let mut node = Node::new(node_id, fabric_index);
    node.vendor_id = scalars.vendor_id;
    node.product_id = scalars.product_id;
    node.discriminator = scalars.discriminator;
    node.port = scalars.port;
    node.last_discovered = scalars.last_discovered;
    node.setup_payload = scalars.setup_payload;
    for decoded in endpoints {
        let endpoint = node.get_or_add_endpoint(decoded.endpoint_id);
        for cluster in decoded.clusters {
            endpoint.add_cluster(cluster);
        }
        for device_type in decoded.device_types {
            endpoint.add_device_type(device_type);
        }
    }
    Ok(node)
}

#[derive(Default)]
struct NodeScalars {
    vendor_id: u16,
    product_id: u16,
    discriminator: u16,
    port: u16,
    last_discovered: i64,
    setup_payload: String,
}

struct DecodedEndpoint {
    endpoint_id: u16,
    clusters: Vec<u32>,
    device_types: Vec<u32>,
}

fn decode_endpoint(reader: &mut Reader) -> Result<DecodedEndpoint, CacheError> {
    let mut endpoint_id = None;
    let mut clusters = vec![];
    let mut device_types = vec![];
    loop {
        let element = reader.next()?;
        match (element.get_control(), element.get_type()) {
            (_, TlvType::EndOfContainer) => break,
            (TagControl::ContextSpecific(TAG_ENDPOINT_ID), TlvType::UnsignedInt(_)) => {
                endpoint_id = Some(unsigned(&element, "endpoint id")?)
            }
            (TagControl::ContextSpecific(TAG_CLUSTERS), TlvType::Array) => {
                clusters = decode_id_array(reader, TAG_CLUSTER_ID)?
            }
            (TagControl::ContextSpecific(TAG_DEVICE_TYPES), TlvType::Array) => {
                device_types = decode_id_array(reader, TAG_DEVICE_TYPE_ID)?
            }
            _ => return Err(CacheError::Malformed("unexpected endpoint element")),
        }
    }
    Ok(DecodedEndpoint {
        endpoint_id: endpoint_id.ok_or(CacheError::Malformed("missing endpoint id"))?,
        clusters,
        device_types,
    })
}

fn decode_id_array(reader: &mut Reader, item_tag: u8) -> Result<Vec<u32>, CacheError> {
    let mut ids = vec![];
    loop {
        let element = reader.next()?;
        match (element.get_control(), element.get_type()) {
            (_, TlvType::EndOfContainer) => return Ok(ids),
            (TagControl::ContextSpecific(tag), TlvType::UnsignedInt(_)) if tag == item_tag => {
                ids.push(unsigned(&element, "id")?)
            }
            _ => return Err(CacheError::Malformed("unexpected id array element")),
        }
    }
}

/// A reader for which running out of input is a malformed envelope
struct Reader<'a>(TlvReader<'a>);

impl Reader<'_> {
    fn next(&mut self) -> Result<Element, CacheError> {
        self.0
            .next_element()?
            .ok_or(CacheError::Malformed("unterminated container"))
    }
}

fn expect_container(
    element: &Element,
    tlv_type: TlvType,
    control: TagControl,
) -> Result<(), CacheError> {
    if element.get_type() != tlv_type || element.get_control() != control {
        return Err(CacheError::Malformed("unexpected container"));
    }
    Ok(())
}

fn unsigned<T: TryFrom<u64>>(element: &Element, what: &'static str) -> Result<T, CacheError> {
    element
        .get_value()
        .as_u64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or(CacheError::Malformed(what))
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::data_model::DeviceType;

    fn sample_nodes() -> Vec<Node> {
        let mut light = Node::new(0x1122_3344_5566_7788, 1);
        light.vendor_id = 0xFFF1;
        light.product_id = 0x8000;
        light.discriminator = 3840;
        light.port = 5540;
        light.last_discovered = 1_700_000_000_000;
        light.setup_payload = "MT:Y.K9042C00KA0648G00".to_string();
        light.get_or_add_endpoint(0).add_cluster(0x001D);
        let ep = light.get_or_add_endpoint(1);
        ep.add_cluster(0x0006);
        ep.add_cluster(0x0008);
        ep.add_cluster(0x0300);
        ep.add_device_type(DeviceType::ExtendedColorLight.id());

        let mut sensor = Node::new(42, 2);
        let ep = sensor.get_or_add_endpoint(3);
        ep.add_cluster(0x0402);
        ep.add_device_type(DeviceType::TemperatureSensor.id());
        ep.add_device_type(0xFFFF_0001);
        vec![light, sensor]
    }

    fn random_nodes(rng: &mut StdRng) -> Vec<Node> {
        const DEVICE_TYPES: [u32; 5] = [0x0202, 0x010D, 0x0302, 0x0015, 0xFFFF_0001];
        let mut nodes: Vec<Node> = vec![];
        for _ in 0..rng.gen_range(0..5) {
            let node_id = rng.gen::<u64>();
            if nodes.iter().any(|n| n.node_id == node_id) {
                continue;
            }
            let mut node = Node::new(node_id, rng.gen());
            node.vendor_id = rng.gen();
            node.port = rng.gen();
            for _ in 0..rng.gen_range(0..20) {
                let ep = node.get_or_add_endpoint(rng.gen_range(0..6));
                if rng.gen_bool(0.5) {
                    ep.add_cluster(rng.gen_range(0..0x0500));
                } else {
                    ep.add_device_type(DEVICE_TYPES[rng.gen_range(0..DEVICE_TYPES.len())]);
                }
            }
            nodes.push(node);
        }
        nodes
    }

    fn memory_cache() -> (Arc<MemoryStore>, MatterCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = MatterCache::new(store.clone());
        (store, cache)
    }

    #[test]
    fn test_round_trip() {
        let (_, cache) = memory_cache();
        let nodes = sample_nodes();
        let bytes = cache.encode(&nodes).unwrap();
        assert_eq!(bytes, cache.encode(&nodes).unwrap());

        let decoded = MatterCache::decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        for (a, b) in nodes.iter().zip(&decoded) {
            assert_eq!(a, b);
            assert_eq!(a.vendor_id, b.vendor_id);
            assert_eq!(a.product_id, b.product_id);
            assert_eq!(a.discriminator, b.discriminator);
            assert_eq!(a.port, b.port);
            assert_eq!(a.last_discovered, b.last_discovered);
            assert_eq!(a.setup_payload, b.setup_payload);
            assert_eq!(a.endpoints().len(), b.endpoints().len());
            for (x, y) in a.endpoints().iter().zip(b.endpoints()) {
                assert_eq!(x.endpoint_id(), y.endpoint_id());
                assert_eq!(x.clusters(), y.clusters());
                assert_eq!(x.device_types(), y.device_types());
                assert_eq!(x.devices().len(), y.devices().len());
            }
        }
        assert!(decoded[1].has_device(DeviceType::TemperatureSensor));
    }

    #[test]
    fn test_round_trip_random_inventories() {
        let (_, cache) = memory_cache();
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..200 {
            let nodes = random_nodes(&mut rng);
            let decoded = MatterCache::decode(&cache.encode(&nodes).unwrap()).unwrap();
            let ids = |nodes: &[Node]| nodes.iter().map(|n| n.node_id).collect::<Vec<_>>();
            assert_eq!(ids(&nodes), ids(&decoded));
            for (a, b) in nodes.iter().zip(&decoded) {
                assert_eq!(a.fabric_index, b.fabric_index);
                assert_eq!(a.vendor_id, b.vendor_id);
                assert_eq!(a.port, b.port);
                let endpoint_ids = |n: &Node| {
                    n.endpoints()
                        .iter()
                        .map(|e| e.endpoint_id())
                        .collect::<Vec<_>>()
                };
                assert_eq!(endpoint_ids(a), endpoint_ids(b));
                for (x, y) in a.endpoints().iter().zip(b.endpoints()) {
                    assert_eq!(x.clusters(), y.clusters());
                    assert_eq!(x.device_types(), y.device_types());
                }
            }
        }
    }

    #[test]
    fn test_empty_envelope() {
        let (_, cache) = memory_cache();
        let bytes = cache.encode(Vec::<&Node>::new()).unwrap();
        assert_eq!(bytes, hex!("15 24 01 01 36 03 18 18"));
        assert!(MatterCache::decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_capacity_exceeded_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let cache = MatterCache::with_max_size(store.clone(), 64);
        let nodes = sample_nodes();
        match cache.store(&nodes) {
            Err(CacheError::CapacityExceeded { size, max: 64 }) => assert!(size > 64),
            r => panic!("unexpected result {r:?}"),
        }
        assert_eq!(store.get(CACHE_KEY).unwrap(), None);
    }

    #[test]
    fn test_capacity_exceeded_keeps_previous_envelope() {
        let store = Arc::new(MemoryStore::new());
        let cache = MatterCache::with_max_size(store.clone(), 64);
        let small = Node::new(7, 1);
        cache.store([&small]).unwrap();
        let before = store.get(CACHE_KEY).unwrap();

        assert!(matches!(
            cache.store(&sample_nodes()),
            Err(CacheError::CapacityExceeded { max: 64, .. })
        ));
        let mut light = sample_nodes().remove(0);
        light.node_id = 8;
        assert!(matches!(
            cache.add_node(&light),
            Err(CacheError::CapacityExceeded { .. })
        ));

        assert_eq!(store.get(CACHE_KEY).unwrap(), before);
        let loaded = cache.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].node_id, 7);
    }

    #[test]
    fn test_unsupported_version() {
        let bytes = hex!("15 24 01 02 36 03 18 18");
        assert!(matches!(
            MatterCache::decode(&bytes),
            Err(CacheError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_malformed() {
        // unknown envelope tag 2
        let unknown_tag = hex!("15 24 01 01 24 02 05 36 03 18 18");
        assert!(matches!(
            MatterCache::decode(&unknown_tag),
            Err(CacheError::Malformed(_))
        ));
        // array never closed
        let unterminated = hex!("15 24 01 01 36 03");
        assert!(matches!(
            MatterCache::decode(&unterminated),
            Err(CacheError::Malformed("unterminated container"))
        ));
        // outer element is an array
        let wrong_outer = hex!("16 18");
        assert!(matches!(
            MatterCache::decode(&wrong_outer),
            Err(CacheError::Malformed(_))
        ));
        // integer cut short
        let truncated = hex!("15 25 01 01");
        assert!(matches!(
            MatterCache::decode(&truncated),
            Err(CacheError::Tlv(TlvError::Truncated(_)))
        ));
        // node without a fabric index
        let no_fabric = hex!("15 24 01 01 36 03 15 24 01 07 18 18 18");
        assert!(matches!(
            MatterCache::decode(&no_fabric),
            Err(CacheError::Malformed("missing fabric index"))
        ));
    }

    #[test]
    fn test_load_missing_or_malformed_is_empty() {
        let (store, cache) = memory_cache();
        assert!(cache.load().is_empty());
        store.put(CACHE_KEY, &hex!("15 24 01")).unwrap();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn test_add_replace_delete_purge() {
        let (store, cache) = memory_cache();
        let mut nodes = sample_nodes();
        let sensor = nodes.pop().unwrap();
        let light = nodes.pop().unwrap();

        cache.add_node(&light).unwrap();
        cache.add_node(&sensor).unwrap();
        let mut moved = Node::new(light.node_id, 3);
        moved.get_or_add_endpoint(1).add_cluster(0x0006);
        cache.add_node(&moved).unwrap();

        let loaded = cache.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].node_id, light.node_id);
        assert_eq!(loaded[0].fabric_index, 3);
        assert_eq!(loaded[1], sensor);

        assert!(cache.delete_node(42).unwrap());
        assert!(!cache.delete_node(42).unwrap());
        assert_eq!(cache.load().len(), 1);

        cache.purge().unwrap();
        cache.purge().unwrap();
        assert_eq!(store.get(CACHE_KEY).unwrap(), None);
    }
}
