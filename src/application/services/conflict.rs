//! ローカル履歴とリモート履歴の突き合わせ。副作用を持たない。

use crate::domain::entities::{ChangeRecord, ConflictResolution};
use crate::domain::value_objects::ConflictPolicy;
use std::collections::BTreeMap;

/// 両側の id の和集合を作り、各 id を `to_upload` か `to_download` のちょうど一方に振り分ける。
///
/// - 片側にしか無い id はその側から反対側へ送る
/// - 両側にある id は `policy` に従う。`Newest` で時刻が同じ場合はリモートを採用する
/// - 同じ側に同じ id が複数ある場合は時刻が最も新しいものだけを見る
///
/// 出力は id 順で、入力の並びに依存しない。
pub fn resolve_conflicts(
    local: &[ChangeRecord],
    remote: &[ChangeRecord],
    policy: ConflictPolicy,
) -> ConflictResolution {
    let local = latest_by_id(local);
    let remote = latest_by_id(remote);

    let mut resolution = ConflictResolution::default();

    for (id, local_record) in &local {
        match remote.get(id) {
            None => resolution.to_upload.push((*local_record).clone()),
            Some(remote_record) => {
                if local_wins(local_record, remote_record, policy) {
                    resolution.to_upload.push((*local_record).clone());
                } else {
                    resolution.to_download.push((*remote_record).clone());
                }
            }
        }
    }

    for (id, remote_record) in &remote {
        if !local.contains_key(id) {
            resolution.to_download.push((*remote_record).clone());
        }
    }

    resolution.to_download.sort_by(|a, b| a.id.cmp(&b.id));
    resolution
}

fn local_wins(local: &ChangeRecord, remote: &ChangeRecord, policy: ConflictPolicy) -> bool {
    match policy {
        ConflictPolicy::Local => true,
        ConflictPolicy::Remote => false,
        ConflictPolicy::Newest => local.timestamp > remote.timestamp,
    }
}

fn latest_by_id(records: &[ChangeRecord]) -> BTreeMap<&str, &ChangeRecord> {
    let mut latest: BTreeMap<&str, &ChangeRecord> = BTreeMap::new();
    for record in records {
        latest
            .entry(record.id.as_str())
            .and_modify(|current| {
                if supersedes(record, current) {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
}

/// 同時刻の重複はペイロードの文字列表現で決める（入力順に依存させない）
fn supersedes(candidate: &ChangeRecord, current: &ChangeRecord) -> bool {
    candidate.timestamp > current.timestamp
        || (candidate.timestamp == current.timestamp
            && candidate.payload.to_string() > current.payload.to_string())
}
