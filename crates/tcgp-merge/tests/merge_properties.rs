use std::path::{Path, PathBuf};

use tcgp_merge::{merge_csv_files, MergeInputs};
use tempfile::tempdir;

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write fixture");
    path
}

fn read_back(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open merged");
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.expect("record").iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}

#[test]
fn header_is_first_seen_union_across_files() {
    let dir = tempdir().expect("tempdir");
    let a = write(dir.path(), "a.csv", "productId,groupId,name\n1,10,A\n");
    let b = write(dir.path(), "b.csv", "name,productId,marketPrice,groupId\nB,2,1.25,10\n");
    let c = write(dir.path(), "c.csv", "productId,subTypeName,groupId,marketPrice\n3,Foil,11,4.00\n");
    let out = dir.path().join("out.csv");

    merge_csv_files(&MergeInputs::new(vec![a, b, c]).expect("inputs"), &out).expect("merge");

    let (headers, rows) = read_back(&out);
    assert_eq!(
        headers,
        vec!["productId", "groupId", "name", "marketPrice", "subTypeName"]
    );
    assert_eq!(rows[0], vec!["1", "10", "A", "", ""]);
    assert_eq!(rows[1], vec!["2", "10", "B", "1.25", ""]);
    assert_eq!(rows[2], vec!["3", "11", "", "4.00", "Foil"]);
}

#[test]
fn last_row_within_last_file_wins() {
    let dir = tempdir().expect("tempdir");
    let a = write(
        dir.path(),
        "a.csv",
        "productId,groupId,price\n7,1,1.00\n8,1,2.00\n7,1,3.00\n",
    );
    let b = write(dir.path(), "b.csv", "productId,groupId,price\n8,1,4.00\n7,1,5.00\n7,1,6.00\n");
    let out = dir.path().join("out.csv");

    let stats = merge_csv_files(&MergeInputs::new(vec![a, b]).expect("inputs"), &out).expect("merge");

    let (_, rows) = read_back(&out);
    assert_eq!(rows, vec![vec!["7", "1", "6.00"], vec!["8", "1", "4.00"]]);
    assert_eq!(stats.input_rows, 6);
    assert_eq!(stats.output_rows, 2);
}

#[test]
fn same_product_in_different_groups_is_distinct() {
    let dir = tempdir().expect("tempdir");
    let a = write(dir.path(), "a.csv", "productId,groupId\n1,1\n1,2\n2,1\n");
    let out = dir.path().join("out.csv");

    let stats = merge_csv_files(&MergeInputs::new(vec![a]).expect("inputs"), &out).expect("merge");
    assert_eq!(stats.output_rows, stats.input_rows);
}

#[test]
fn awkward_values_survive_a_reparse() {
    let dir = tempdir().expect("tempdir");
    let mut writer = csv::Writer::from_path(dir.path().join("a.csv")).expect("fixture writer");
    let awkward = [
        "comma, inside",
        "Say \"hi\"",
        "line one\nline two",
        "",
        "trailing \"",
    ];
    writer.write_record(["productId", "groupId", "name"]).expect("header");
    for (i, value) in awkward.iter().enumerate() {
        writer
            .write_record([i.to_string().as_str(), "5", *value])
            .expect("row");
    }
    writer.flush().expect("flush");
    drop(writer);

    let out = dir.path().join("out.csv");
    merge_csv_files(
        &MergeInputs::new(vec![dir.path().join("a.csv")]).expect("inputs"),
        &out,
    )
    .expect("merge");

    let (_, rows) = read_back(&out);
    let names: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();
    assert_eq!(names, awkward.to_vec());
}

#[test]
fn merging_a_file_twice_matches_merging_it_once() {
    let dir = tempdir().expect("tempdir");
    let a = write(
        dir.path(),
        "a.csv",
        "productId,groupId,price\n1,1,1.00\n2,1,2.00\n1,1,1.50\n",
    );
    let once = dir.path().join("once.csv");
    let twice = dir.path().join("twice.csv");

    merge_csv_files(&MergeInputs::new(vec![a.clone()]).expect("inputs"), &once).expect("once");
    merge_csv_files(&MergeInputs::new(vec![a.clone(), a]).expect("inputs"), &twice).expect("twice");

    assert_eq!(
        std::fs::read(&once).expect("read once"),
        std::fs::read(&twice).expect("read twice")
    );
}

#[test]
fn existing_destination_is_truncated() {
    let dir = tempdir().expect("tempdir");
    let a = write(dir.path(), "a.csv", "productId,groupId\n1,1\n");
    let out = write(dir.path(), "out.csv", &"stale,content\n".repeat(100));

    merge_csv_files(&MergeInputs::new(vec![a]).expect("inputs"), &out).expect("merge");
    assert_eq!(
        std::fs::read_to_string(&out).expect("read"),
        "\"productId\",\"groupId\"\n\"1\",\"1\"\n"
    );
}

#[test]
fn leading_bom_is_stripped_from_header() {
    let dir = tempdir().expect("tempdir");
    let a = write(dir.path(), "a.csv", "\u{feff}productId,groupId,price\n1,1,2.00\n");
    let b = write(dir.path(), "b.csv", "productId,groupId,price\n1,1,3.00\n");
    let out = dir.path().join("out.csv");

    merge_csv_files(&MergeInputs::new(vec![a, b]).expect("inputs"), &out).expect("merge");

    let (headers, rows) = read_back(&out);
    assert_eq!(headers, vec!["productId", "groupId", "price"]);
    assert_eq!(rows, vec![vec!["1", "1", "3.00"]]);
}

#[test]
fn duplicate_headers_share_a_column_and_rightmost_wins() {
    let dir = tempdir().expect("tempdir");
    let a = write(dir.path(), "a.csv", "productId,groupId,price,price\n1,1,x,2\n");
    let out = dir.path().join("out.csv");

    merge_csv_files(&MergeInputs::new(vec![a]).expect("inputs"), &out).expect("merge");

    let (headers, rows) = read_back(&out);
    assert_eq!(headers, vec!["productId", "groupId", "price"]);
    assert_eq!(rows, vec![vec!["1", "1", "2"]]);
}

#[test]
fn header_only_file_adds_columns_but_no_rows() {
    let dir = tempdir().expect("tempdir");
    let a = write(dir.path(), "a.csv", "productId,groupId,price\n2,1,y\n");
    let b = write(dir.path(), "b.csv", "productId,groupId,foil\n");
    let out = dir.path().join("out.csv");

    let stats = merge_csv_files(&MergeInputs::new(vec![a, b]).expect("inputs"), &out).expect("merge");

    let (headers, rows) = read_back(&out);
    assert_eq!(headers, vec!["productId", "groupId", "price", "foil"]);
    assert_eq!(rows, vec![vec!["2", "1", "y", ""]]);
    assert_eq!(stats.input_rows, 1);
}
