//! Static declaration tables, one per source command.

use crate::compat::RenameRule;
use crate::metrics::{ConnectionCount, ConnectionsCreated, Record};
use crate::path::{DeclarationTable, TimestampUnit};
use mongodb_exporter_component::MetricKind;

/// Bumped whenever a change to the tables alters emitted names or labels.
pub const DECLARATIONS_VERSION: u32 = 1;

/// Fields that carry server metadata rather than measurements.
const COMMON_DROPS: [&str; 3] = ["$clusterTime", "operationTime", "ok"];

fn with_common_drops(table: DeclarationTable) -> DeclarationTable {
    COMMON_DROPS.iter().fold(table, |table, path| table.drop(path))
}

fn server_status() -> DeclarationTable {
    let table = with_common_drops(DeclarationTable::new("ss"))
        .drop("host")
        .drop("version")
        .drop("process")
        .drop("pid")
        .drop("localTime")
        // locks
        .label_keys("locks", "resource")
        .label_keys("locks.acquireCount", "mode")
        .label_keys("locks.acquireWaitCount", "mode")
        .label_keys("locks.timeAcquiringMicros", "mode")
        .label_keys("locks.deadlockCount", "mode")
        .counter("locks")
        // latencies
        .label_keys("opLatencies", "op_type")
        .label_field("opLatencies.histogram", "micros", "micros")
        .counter("opLatencies")
        // commands
        .label_keys("metrics.commands", "cmd")
        .counter("metrics")
        .kind("metrics.cursor.open", MetricKind::Gauge)
        .kind("metrics.repl.buffer", MetricKind::Gauge)
        .counter("opcounters")
        .counter("opcountersRepl")
        .counter("asserts")
        .counter("network")
        .counter("extra_info.page_faults")
        .counter("globalLock.totalTime")
        .compat(RenameRule::prefix("asserts", "asserts_total", "type"))
        .compat(RenameRule::prefix("mem", "memory", "type"))
        .compat(RenameRule::prefix(
            "opcounters",
            "mongod_op_counters_total",
            "type",
        ))
        .compat(RenameRule::prefix(
            "opcountersRepl",
            "mongod_op_counters_repl_total",
            "type",
        ))
        .compat(
            RenameRule::exact("network.bytesIn", "network_bytes_total")
                .with_label("state", "in_bytes"),
        )
        .compat(
            RenameRule::exact("network.bytesOut", "network_bytes_total")
                .with_label("state", "out_bytes"),
        )
        .compat(RenameRule::exact(
            "network.numRequests",
            "network_metrics_num_requests_total",
        ))
        .compat(RenameRule::exact("uptime", "instance_uptime_seconds"))
        .compat(RenameRule::prefix(
            "globalLock.currentQueue",
            "mongod_global_lock_current_queue",
            "count_type",
        ))
        .compat(RenameRule::prefix(
            "metrics.document",
            "mongod_metrics_document_total",
            "state",
        ))
        .compat(RenameRule::prefix(
            "metrics.cursor.open",
            "mongod_metrics_cursor_open",
            "csr_type",
        ))
        .compat(RenameRule::exact(
            "metrics.cursor.timedOut",
            "mongod_metrics_cursor_timed_out_total",
        ))
        .compat(RenameRule::exact(
            "extra_info.page_faults",
            "extra_info_page_faults_total",
        ));

    // hand-declared metrics own their source fields
    SERVER_STATUS_RECORDS
        .iter()
        .flat_map(|record| record.source_paths())
        .fold(table, |table, path| table.drop(path))
}

fn diagnostic_data() -> DeclarationTable {
    with_common_drops(DeclarationTable::new(""))
        // owned by their own collectors
        .drop("serverStatus")
        .drop("replSetGetStatus")
        .drop("start")
        .drop("end")
        .alias("systemMetrics", "sys")
        .alias("local.oplog.rs.stats", "oplog_stats")
        .drop("local.oplog.rs.stats.ns")
        .drop("local.oplog.rs.stats.wiredTiger")
        .drop("local.oplog.rs.stats.indexDetails")
        .label_keys("systemMetrics.disks", "device")
        .label_keys("systemMetrics.mounts", "mount")
        .counter("systemMetrics.cpu")
}

fn replset_status() -> DeclarationTable {
    with_common_drops(DeclarationTable::new("rs"))
        .drop("set")
        .drop("date")
        .drop("$gleStats")
        .drop("lastStableRecoveryTimestamp")
        .label_field("members", "member_idx", "name")
        .drop("members._id")
        .drop("members.self")
        .compat(RenameRule::exact("members.health", "mongod_replset_member_health"))
        .compat(RenameRule::exact("members.state", "mongod_replset_member_state"))
        .compat(RenameRule::exact("members.uptime", "mongod_replset_member_uptime"))
        .compat(RenameRule::exact("myState", "mongod_replset_my_state"))
        .compat(RenameRule::exact("term", "mongod_replset_term"))
}

fn replset_config() -> DeclarationTable {
    with_common_drops(DeclarationTable::new("cfg"))
        .drop("_id")
        .label_field("members", "member_idx", "host")
        .drop("members._id")
        .drop("settings.getLastErrorModes")
        .drop("settings.getLastErrorDefaults")
        .compat(RenameRule::exact("version", "mongod_replset_config_version"))
}

fn coll_stats() -> DeclarationTable {
    with_common_drops(DeclarationTable::new("collstats"))
        .drop("ns")
        .drop("wiredTiger")
        .drop("indexDetails")
        .drop("indexBuilds")
        .label_keys("indexSizes", "index")
        .rename("indexSizes", "index_size")
        .rename("totalIndexSize", "indexes_size")
        .compat(RenameRule::exact("size", "db_coll_size"))
        .compat(RenameRule::exact("count", "db_coll_count"))
        .compat(RenameRule::exact("avgObjSize", "db_coll_avgobjsize"))
        .compat(RenameRule::exact("storageSize", "db_coll_storage_size"))
        .compat(RenameRule::exact("nindexes", "db_coll_indexes"))
        .compat(RenameRule::exact("indexSizes", "db_coll_index_size"))
        .compat(RenameRule::exact("totalIndexSize", "db_coll_indexes_size"))
}

fn index_stats() -> DeclarationTable {
    DeclarationTable::new("indexstats")
        .drop("name")
        .drop("key")
        .drop("host")
        .drop("spec")
        .drop("shard")
        .counter("accesses.ops")
        .timestamp("accesses.since", TimestampUnit::Seconds)
}

lazy_static::lazy_static! {
    pub static ref SERVER_STATUS_RECORDS: Vec<Box<dyn Record>> = vec![
        Box::new(ConnectionCount),
        Box::new(ConnectionsCreated),
    ];
    pub static ref SERVER_STATUS: DeclarationTable = server_status();
    pub static ref DIAGNOSTIC_DATA: DeclarationTable = diagnostic_data();
    pub static ref REPLSET_STATUS: DeclarationTable = replset_status();
    pub static ref REPLSET_CONFIG: DeclarationTable = replset_config();
    pub static ref COLL_STATS: DeclarationTable = coll_stats();
    pub static ref INDEX_STATS: DeclarationTable = index_stats();
}
