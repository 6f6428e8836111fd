//! Generated etcd v3 `KV`/`Watch` stubs, compiled by `build.rs` from the
//! vendored `proto/etcd.proto` subset.

pub mod etcdserverpb {
	tonic::include_proto!("etcdserverpb");
}
