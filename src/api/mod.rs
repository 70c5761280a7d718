pub mod match_plan_dto;
pub mod reservation_dto;
