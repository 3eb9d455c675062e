#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub fn legacy_line(date: &str, themes: &str, tone: &str) -> String {
    format!("{date}\t1\t\t{themes}\t\t\tFederal Reserve\t{tone}\t\tnytimes.com\thttp://example.com/a\n")
}

pub fn current_line(date: &str, themes: &str, tone: &str) -> String {
    let mut fields = vec![""; 27];
    fields[0] = "20150102000000-1";
    fields[1] = date;
    fields[2] = "1";
    fields[3] = "reuters.com";
    fields[7] = themes;
    fields[13] = "united nations";
    fields[15] = tone;
    format!("{}\n", fields.join("\t"))
}

pub fn write_file(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).expect("write fixture");
}

/// One legacy file with a single relevant record, one current file with none.
pub fn write_scenario_inputs(dir: &Path) {
    write_file(
        dir,
        "20150101.gkg.csv",
        &legacy_line("20150101", "ECON_STOCKMARKET;", "5.0,2,1,3.0,0,0"),
    );
    write_file(
        dir,
        "20150102000000.gkg.csv",
        &[
            current_line("20150102000000", "PROTEST;ARMEDCONFLICT;", "-3,1,4,5,0,0,100"),
            current_line("20150102000000", "SOC_GENERALCRIME;", "-1,1,2,3,0,0,100"),
        ]
        .concat(),
    );
}

pub fn data_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("read sink")
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

pub fn ledger_entries(path: &Path) -> Vec<String> {
    let mut entries: Vec<String> = fs::read_to_string(path)
        .expect("read ledger")
        .lines()
        .map(str::to_string)
        .collect();
    entries.sort();
    entries
}
